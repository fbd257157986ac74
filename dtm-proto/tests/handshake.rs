use dtm_proto::header::{ExchangeFlag, PacketType};
use dtm_proto::params::catalog;
use dtm_proto::{Callbacks, DispatchAction, ExchangeStateMachine, OutboundBuffer, Role, TransportDispatcher};

/// Drives two independently-constructed state machines through all nine
/// stages over simulated framed bytes (dispatch + exchange together, rather
/// than calling `build_outbound`/`accept_inbound` directly), then proves the
/// established ciphers round-trip a Message packet end to end.
#[test]
fn full_handshake_over_framed_transport_establishes_and_exchanges_a_message() {
    let params_client = catalog::x41rnt1r1();
    let params_server = catalog::x41rnt1r1();

    let mut client = ExchangeStateMachine::new(Role::Client, params_client, b"client-pub".to_vec(), b"client-secret".to_vec());
    let mut server = ExchangeStateMachine::new(Role::Server, params_server, b"server-pub".to_vec(), b"server-secret".to_vec());

    let mut client_out = OutboundBuffer::new();
    let mut server_out = OutboundBuffer::new();
    let mut client_in = TransportDispatcher::new();
    let mut server_in = TransportDispatcher::new();

    let mut client_cb = Callbacks::default();
    let mut server_cb = Callbacks::default();

    for _ in ExchangeFlag::ORDER {
        let client_payload = client.build_outbound().expect("client build_outbound");
        let server_payload = server.build_outbound().expect("server build_outbound");

        let client_frame = client_out.frame(PacketType::Exchange, client.current_stage() as u16, 0, &client_payload);
        let server_frame = server_out.frame(PacketType::Exchange, server.current_stage() as u16, 0, &server_payload);

        // Each peer's frame for this stage arrives whole and in order, so a
        // single ingest+drain delivers exactly one action on each side.
        server_in.ingest(&client_frame);
        client_in.ingest(&server_frame);

        for action in server_in.drain() {
            if let DispatchAction::Exchange { flag, payload, .. } = action {
                server.accept_inbound(flag, &payload, &mut server_cb).expect("server accept_inbound");
            }
        }
        for action in client_in.drain() {
            if let DispatchAction::Exchange { flag, payload, .. } = action {
                client.accept_inbound(flag, &payload, &mut client_cb).expect("client accept_inbound");
            }
        }
    }

    assert!(client.is_established());
    assert!(server.is_established());
    assert_eq!(client.peer_public_id(), Some(b"server-pub".as_slice()));
    assert_eq!(server.peer_public_id(), Some(b"client-pub".as_slice()));

    let (mut client_send, mut client_recv) = client.take_ciphers().unwrap();
    let (mut server_send, mut server_recv) = server.take_ciphers().unwrap();

    let mut plaintext = b"hello over the established channel".to_vec();
    client_send.transform(&mut plaintext);
    server_recv.transform(&mut plaintext);
    assert_eq!(plaintext, b"hello over the established channel");

    let mut reply = b"right back at you".to_vec();
    server_send.transform(&mut reply);
    client_recv.transform(&mut reply);
    assert_eq!(reply, b"right back at you");
}

#[test]
fn obfuscated_profile_still_establishes() {
    let params_client = catalog::x41rnt1r1_obfuscated();
    let params_server = catalog::x41rnt1r1_obfuscated();

    let mut client = ExchangeStateMachine::new(Role::Client, params_client, b"c".to_vec(), b"cs".to_vec());
    let mut server = ExchangeStateMachine::new(Role::Server, params_server, b"s".to_vec(), b"ss".to_vec());
    let mut cb_c = Callbacks::default();
    let mut cb_s = Callbacks::default();

    for stage in ExchangeFlag::ORDER {
        let c_payload = client.build_outbound().unwrap();
        let s_payload = server.build_outbound().unwrap();
        server.accept_inbound(stage, &c_payload, &mut cb_s).unwrap();
        client.accept_inbound(stage, &s_payload, &mut cb_c).unwrap();
    }

    assert!(client.is_established());
    assert!(server.is_established());
}
