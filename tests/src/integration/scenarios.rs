//! # Exchange Lifecycle Scenarios
//!
//! One exchange at a time over a shared in-memory transport:
//!
//! 1. Empty-body GET answered with headers and end
//! 2. Remote error before any headers
//! 3. Handshake that is never acknowledged
//! 4. Local abort mid-stream, late remote end absorbed
//! 5. Request-body credit stall and resume
//! 6. Silent peer hitting the idle deadline
//! 7. Transport loss with exchanges in flight
//! 8. Client disconnect while the response is relayed
//! 9. Identifier reuse while active and after teardown

#[cfg(test)]
mod tests {
    use crate::integration::{drain, open_accepted, open_expect_failure, open_get};
    use crate::peer::{AckPolicy, PeerEvent};
    use crate::{quick_config, tunnel};
    use bytes::Bytes;
    use rt_01_exchange_bridge::domain::{
        STATUS_BAD_GATEWAY, STATUS_GATEWAY_TIMEOUT, STATUS_SERVER_FAULT,
    };
    use rt_01_exchange_bridge::{
        BridgeConfig, BridgeError, ExchangeOutcome, ExchangeState, FailureReason, HandshakeCause,
        ResponseEvent, TunnelApi,
    };
    use shared_types::{ExchangeId, Headers, RequestDescriptor};
    use std::time::Duration;
    use tokio::time::timeout;

    const WAIT: Duration = Duration::from_secs(3);

    // =============================================================================
    // HAPPY PATH
    // =============================================================================

    #[tokio::test]
    async fn test_get_with_empty_body() {
        let mut t = tunnel(quick_config());
        let (mut bridge, mut remote, mut responses) = open_get(&mut t, "/health").await;
        assert_eq!(bridge.state(), ExchangeState::Active);

        assert!(bridge.end_body().unwrap());
        let (chunks, terminal) = remote.read_body().await;
        assert!(chunks.is_empty());
        assert_eq!(terminal, Some(PeerEvent::End));

        remote.headers(200, Headers::new());
        remote.end();

        let outcome = timeout(WAIT, bridge.finished()).await.unwrap();
        assert_eq!(outcome, ExchangeOutcome::Completed);
        assert_eq!(
            drain(&mut responses).await,
            vec![
                ResponseEvent::Head {
                    status: 200,
                    headers: Headers::new()
                },
                ResponseEvent::End,
            ]
        );
        assert_eq!(bridge.state(), ExchangeState::Completed);
        assert_eq!(t.local.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_post_body_and_response_body_relayed() {
        let mut t = tunnel(quick_config());
        let request = RequestDescriptor::new(
            "POST",
            "/upload",
            [("content-type", "text/plain")].into_iter().collect(),
        );
        let (mut bridge, mut remote, mut responses) = open_accepted(&mut t, request).await;

        let body = tokio_stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"hello ")),
            Ok(Bytes::from_static(b"world")),
        ]);
        bridge.relay_body(body).await.unwrap();

        let (chunks, terminal) = remote.read_body().await;
        assert_eq!(chunks.concat(), b"hello world");
        assert_eq!(terminal, Some(PeerEvent::End));

        let mut headers = Headers::new();
        headers.insert("content-type", "application/json");
        remote.headers(201, headers.clone());
        remote.chunk(Bytes::from_static(b"{\"ok\":"));
        remote.chunk(Bytes::from_static(b"true}"));
        remote.end();

        assert_eq!(
            timeout(WAIT, bridge.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        assert_eq!(
            drain(&mut responses).await,
            vec![
                ResponseEvent::Head {
                    status: 201,
                    headers
                },
                ResponseEvent::Body(Bytes::from_static(b"{\"ok\":")),
                ResponseEvent::Body(Bytes::from_static(b"true}")),
                ResponseEvent::End,
            ]
        );

        let stats = t.service.stats();
        assert_eq!(stats.opened, 1);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.active, 0);
    }

    // =============================================================================
    // REMOTE FAILURES
    // =============================================================================

    #[tokio::test]
    async fn test_remote_error_before_headers() {
        let mut t = tunnel(quick_config());
        let (mut bridge, remote, mut responses) = open_get(&mut t, "/boom").await;
        bridge.end_body().unwrap();

        remote.error("upstream refused");

        let outcome = timeout(WAIT, bridge.finished()).await.unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Failed(FailureReason::RemoteFault("upstream refused".into()))
        );
        assert_eq!(
            drain(&mut responses).await,
            vec![ResponseEvent::Status(STATUS_SERVER_FAULT), ResponseEvent::End]
        );
        assert_eq!(bridge.state(), ExchangeState::Failed);
    }

    #[tokio::test]
    async fn test_both_terminal_events_tear_down_once() {
        let mut t = tunnel(quick_config());
        let (bridge, remote, mut responses) = open_get(&mut t, "/twice").await;

        remote.headers(200, Headers::new());
        remote.end();
        remote.error("late error");

        assert_eq!(
            timeout(WAIT, bridge.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        let events = drain(&mut responses).await;
        assert_eq!(events.last(), Some(&ResponseEvent::End));
        assert_eq!(events.len(), 2);
        // The owner dropped the sink after its single end.
        assert_eq!(timeout(WAIT, responses.recv()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_garbage_headers_fail_only_that_exchange() {
        let mut t = tunnel(quick_config());
        let (bad, bad_remote, mut bad_responses) = open_get(&mut t, "/bad").await;
        let (good, good_remote, mut good_responses) = open_get(&mut t, "/good").await;

        bad_remote.garbage_headers();
        good_remote.headers(204, Headers::new());
        good_remote.end();

        assert!(matches!(
            timeout(WAIT, bad.finished()).await.unwrap(),
            ExchangeOutcome::Failed(FailureReason::ProtocolViolation(_))
        ));
        assert_eq!(
            drain(&mut bad_responses).await,
            vec![ResponseEvent::Status(STATUS_BAD_GATEWAY), ResponseEvent::End]
        );
        assert_eq!(
            timeout(WAIT, good.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        assert_eq!(drain(&mut good_responses).await.len(), 2);
    }

    // =============================================================================
    // HANDSHAKE
    // =============================================================================

    #[tokio::test]
    async fn test_handshake_never_acknowledged() {
        let mut t = tunnel(quick_config());
        t.peer.set_policy(AckPolicy::Silent);

        let (failure, _responses) =
            open_expect_failure(&t, RequestDescriptor::new("GET", "/", Headers::new())).await;
        assert_eq!(
            failure.error,
            BridgeError::HandshakeFailure {
                cause: HandshakeCause::TimedOut
            }
        );
        assert!(t.peer.next_request().await.is_some());
        assert_eq!(t.local.listener_count(), 0);
        assert_eq!(t.service.stats().handshake_failures, 1);
        assert_eq!(t.service.stats().active, 0);
    }

    #[tokio::test]
    async fn test_handshake_rejected_returns_sink() {
        let mut t = tunnel(quick_config());
        t.peer.set_policy(AckPolicy::Reject("no upstream".into()));

        let (mut failure, mut responses) =
            open_expect_failure(&t, RequestDescriptor::new("GET", "/", Headers::new())).await;
        assert_eq!(
            failure.error,
            BridgeError::HandshakeFailure {
                cause: HandshakeCause::Rejected("no upstream".into())
            }
        );
        assert_eq!(t.local.listener_count(), 0);

        // The boundary answers the client itself.
        failure.sink.set_status(STATUS_BAD_GATEWAY).await.unwrap();
        failure.sink.end().await.unwrap();
        assert_eq!(
            drain(&mut responses).await,
            vec![ResponseEvent::Status(STATUS_BAD_GATEWAY), ResponseEvent::End]
        );
    }

    // =============================================================================
    // LOCAL ABORT
    // =============================================================================

    #[tokio::test]
    async fn test_abort_mid_stream() {
        let mut t = tunnel(quick_config());
        let (mut bridge, mut remote, mut responses) = open_get(&mut t, "/stream").await;

        bridge.submit_chunk(Bytes::from_static(b"part")).await.unwrap();
        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Chunk(Bytes::from_static(b"part")))
        );

        remote.headers(200, Headers::new());
        assert!(matches!(
            timeout(WAIT, responses.recv()).await.unwrap(),
            Some(ResponseEvent::Head { status: 200, .. })
        ));

        assert!(bridge.abort("client hung up"));
        let outcome = timeout(WAIT, bridge.finished()).await.unwrap();
        assert_eq!(
            outcome,
            ExchangeOutcome::Failed(FailureReason::LocalAbort("client hung up".into()))
        );
        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Abort("aborted: client hung up".into()))
        );

        // Late terminal event and repeated aborts are no-ops.
        remote.end();
        assert!(!bridge.abort("again"));
        assert_eq!(drain(&mut responses).await, vec![ResponseEvent::End]);
        assert_eq!(timeout(WAIT, responses.recv()).await.unwrap(), None);
        assert_eq!(t.local.listener_count(), 0);

        let err = bridge
            .submit_chunk(Bytes::from_static(b"more"))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::ExchangeClosed);
        assert!(remote.try_next().is_none());
    }

    // =============================================================================
    // FLOW CONTROL
    // =============================================================================

    #[tokio::test]
    async fn test_request_credit_stall_and_resume() {
        let config = BridgeConfig {
            request_window_bytes: 8,
            max_chunk_bytes: 4,
            ..quick_config()
        };
        let mut t = tunnel(config);
        let (mut bridge, mut remote, _responses) = open_get(&mut t, "/upload").await;

        let sender = tokio::spawn(async move {
            let result = bridge
                .submit_chunk(Bytes::from_static(b"0123456789ab"))
                .await;
            (bridge, result)
        });

        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Chunk(Bytes::from_static(b"0123")))
        );
        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Chunk(Bytes::from_static(b"4567")))
        );
        // Window consumed; nothing more until credit arrives.
        assert!(timeout(Duration::from_millis(200), remote.next_event())
            .await
            .is_err());

        remote.grant(4);
        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Chunk(Bytes::from_static(b"89ab")))
        );

        let (mut bridge, result) = timeout(WAIT, sender).await.unwrap().unwrap();
        result.unwrap();
        assert!(bridge.end_body().unwrap());
        assert_eq!(remote.next_event().await, Some(PeerEvent::End));
    }

    #[tokio::test]
    async fn test_response_credit_returned_per_chunk() {
        let config = BridgeConfig {
            response_window_bytes: 16,
            ..quick_config()
        };
        let mut t = tunnel(config);
        let (bridge, mut remote, mut responses) = open_get(&mut t, "/download").await;

        // Initial grant announces the window.
        assert_eq!(remote.next_raw().await, Some(PeerEvent::ResponseCredit(16)));

        remote.chunk(Bytes::from_static(b"0123456789"));
        assert_eq!(remote.next_raw().await, Some(PeerEvent::ResponseCredit(10)));

        remote.end();
        assert_eq!(
            timeout(WAIT, bridge.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        assert_eq!(
            drain(&mut responses).await,
            vec![
                ResponseEvent::Head {
                    status: 200,
                    headers: Headers::new()
                },
                ResponseEvent::Body(Bytes::from_static(b"0123456789")),
                ResponseEvent::End,
            ]
        );
    }

    #[tokio::test]
    async fn test_flow_control_off_sends_no_credit() {
        let config = BridgeConfig {
            flow_control: false,
            ..quick_config()
        };
        let mut t = tunnel(config);
        let (mut bridge, mut remote, _responses) = open_get(&mut t, "/plain").await;

        bridge.submit_chunk(Bytes::from(vec![7u8; 1024])).await.unwrap();
        bridge.end_body().unwrap();

        let mut received = 0;
        loop {
            match remote.next_raw().await {
                Some(PeerEvent::Chunk(chunk)) => received += chunk.len(),
                Some(PeerEvent::End) => break,
                other => panic!("unexpected request event: {other:?}"),
            }
        }
        assert_eq!(received, 1024);

        remote.chunk(Bytes::from_static(b"x"));
        remote.end();
        assert_eq!(
            timeout(WAIT, bridge.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(remote.try_next().is_none());
    }

    // =============================================================================
    // DEADLINES
    // =============================================================================

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let config = BridgeConfig {
            idle_timeout_ms: 250,
            ..quick_config()
        };
        let mut t = tunnel(config);
        let (bridge, mut remote, mut responses) = open_get(&mut t, "/slow").await;

        let outcome = timeout(WAIT, bridge.finished()).await.unwrap();
        assert_eq!(outcome, ExchangeOutcome::Failed(FailureReason::Timeout));
        assert_eq!(
            drain(&mut responses).await,
            vec![ResponseEvent::Status(STATUS_GATEWAY_TIMEOUT), ResponseEvent::End]
        );
        assert_eq!(
            remote.next_event().await,
            Some(PeerEvent::Abort("timed out".into()))
        );
        assert_eq!(t.service.stats().timeouts, 1);
    }

    // =============================================================================
    // TRANSPORT AND SINK LOSS
    // =============================================================================

    #[tokio::test]
    async fn test_transport_loss_fails_active_exchanges() {
        let mut t = tunnel(quick_config());
        let (first, _remote_first, mut first_responses) = open_get(&mut t, "/one").await;
        let (second, _remote_second, mut second_responses) = open_get(&mut t, "/two").await;
        assert_eq!(t.service.stats().active, 2);

        t.peer.transport().close();

        for (bridge, responses) in [
            (&first, &mut first_responses),
            (&second, &mut second_responses),
        ] {
            assert_eq!(
                timeout(WAIT, bridge.finished()).await.unwrap(),
                ExchangeOutcome::Failed(FailureReason::TransportClosed)
            );
            assert_eq!(
                drain(responses).await,
                vec![ResponseEvent::Status(STATUS_BAD_GATEWAY), ResponseEvent::End]
            );
        }
        assert_eq!(t.local.listener_count(), 0);
        assert_eq!(t.service.stats().active, 0);
    }

    #[tokio::test]
    async fn test_client_disconnect_aborts_peer() {
        let mut t = tunnel(quick_config());
        let (bridge, mut remote, responses) = open_get(&mut t, "/gone").await;

        drop(responses);
        remote.headers(200, Headers::new());

        assert!(matches!(
            timeout(WAIT, bridge.finished()).await.unwrap(),
            ExchangeOutcome::Failed(FailureReason::LocalSinkFault(_))
        ));
        assert!(matches!(
            remote.next_event().await,
            Some(PeerEvent::Abort(cause)) if cause.starts_with("response sink fault")
        ));
        assert_eq!(t.local.listener_count(), 0);
    }

    // =============================================================================
    // IDENTIFIERS
    // =============================================================================

    #[tokio::test]
    async fn test_id_reuse_rejected_while_active() {
        let mut t = tunnel(quick_config());
        let id = ExchangeId::new();
        let request = RequestDescriptor::with_id(id, "GET", "/a", Headers::new());

        let (first, remote, mut responses) = open_accepted(&mut t, request.clone()).await;

        let (failure, _rejected) = open_expect_failure(&t, request.clone()).await;
        assert_eq!(failure.error, BridgeError::ExchangeIdInUse { id });

        remote.end();
        assert_eq!(
            timeout(WAIT, first.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
        drain(&mut responses).await;

        // Free again after teardown.
        let (again, remote, _responses) = open_accepted(&mut t, request).await;
        assert_eq!(again.id(), id);
        remote.end();
        assert_eq!(
            timeout(WAIT, again.finished()).await.unwrap(),
            ExchangeOutcome::Completed
        );
    }
}
