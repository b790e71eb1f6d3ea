//! The client against a shell script that plays the debugger.
#![cfg(unix)]

use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time::timeout;
use tspdbg_session::{Breakpoint, DebugInfo, DebuggerClient, Notification, SessionError};
use tspdbg_stream::{Markers, Scope};

const STACK: &str = concat!(
    "<dbg><stacks><stack level=\"0\" currentline=\"3\" name=\"main chunk\">",
    "<locals><variable name=\"x\" value=\"1\" type=\"number\"/></locals>",
    "</stack></stacks></dbg>"
);

fn spawn(script: &str) -> (DebuggerClient, UnboundedReceiver<Notification>) {
    DebuggerClient::spawn(
        "sh",
        &["-c".to_string(), script.to_string()],
        Markers::default(),
        Duration::from_secs(2),
    )
    .unwrap()
}

/// Wait for the first notification matching `pred`.
async fn until(
    notes: &mut UnboundedReceiver<Notification>,
    pred: impl Fn(&Notification) -> bool,
) -> Notification {
    timeout(Duration::from_secs(5), async {
        loop {
            let note = notes.recv().await.expect("notification channel closed");
            if pred(&note) {
                return note;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}

#[tokio::test]
async fn breakpoint_then_run_to_end() {
    let script = format!(
        "printf 'TSP>'; read start; \
         printf '%s' '<dbg>Application hit breakpoint</dbg>{STACK}'; \
         read cmd; printf '<dbg>session-end</dbg>'"
    );
    let (mut client, mut notes) = spawn(&script);

    client
        .start(&DebugInfo {
            file_name: "t.tsp".into(),
            breakpoints: vec![Breakpoint::new(3).to_args()],
        })
        .await
        .unwrap();

    let hit = until(&mut notes, |n| matches!(n, Notification::BreakpointHit(_))).await;
    if let Notification::BreakpointHit(stack) = hit {
        assert_eq!(stack.top().unwrap().current_line, 3);
    }
    {
        let session = client.session();
        let session = session.lock().await;
        assert_eq!(session.variables(0, Scope::Locals)[0].name, "x");
        assert_eq!(session.breakpoints().len(), 1);
    }

    client.continue_run().await.unwrap();
    until(&mut notes, |n| *n == Notification::SessionEnded).await;

    let status = client.terminate().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn refused_assignment_fails_the_wait() {
    let script = format!(
        "printf 'TSP>'; read start; printf '%s' '{STACK}'; read set; \
         printf '%s' '<dbg><SetVariable error=\"[string &quot;t&quot;]:1: bad value\"/></dbg>'; \
         read quit"
    );
    let (mut client, mut notes) = spawn(&script);
    client.start(&DebugInfo::default()).await.unwrap();
    until(&mut notes, |n| matches!(n, Notification::BreakpointHit(_))).await;

    let wait = client
        .set_variable(vec!["x".into()], "oops", Scope::Locals, 0)
        .await
        .unwrap();
    match client.next_stack(wait).await {
        Err(SessionError::Rejected { message }) => assert_eq!(message, "bad value"),
        other => panic!("expected rejection, got {other:?}"),
    }

    let status = client.terminate().await.unwrap();
    assert!(status.success());
}

#[tokio::test]
async fn stderr_output_is_fatal() {
    let (mut client, mut notes) =
        spawn("printf 'TSP>'; read start; echo 'license check failed' >&2; read x");
    client.start(&DebugInfo::default()).await.unwrap();

    let fatal = until(&mut notes, |n| matches!(n, Notification::Fatal(_))).await;
    assert_eq!(fatal, Notification::Fatal("license check failed".into()));

    let status = client.terminate().await.unwrap();
    assert!(status.success());
}
