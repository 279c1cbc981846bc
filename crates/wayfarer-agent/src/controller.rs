//! One query, end to end: credential check, session acquisition, the
//! listing workflow, and a release that runs on every exit path once a
//! session has been acquired.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use wayfarer_core::error::{Result, WayfarerError};
use wayfarer_core::traits::{Agent, AutomationSession, CompletionModel};

use crate::graph::StateRecord;
use crate::lifecycle::SessionLifecycle;
use crate::stages::listing_workflow;

/// The capabilities the workflow stages are bound to.
#[derive(Clone)]
pub struct Collaborators {
    pub agent: Arc<dyn Agent>,
    pub model: Arc<dyn CompletionModel>,
}

/// Everything the controller needs from the outside world.
pub trait RunEnvironment: Send + Sync {
    type Session: AutomationSession;

    /// The LLM credential, if one is configured.
    fn api_key(&self) -> Option<String>;

    /// Open the automation session. Once `cancel` fires this must shut down
    /// whatever it already started and return `Cancelled`.
    fn open_session(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<Self::Session>>;

    /// Build the agent and the summarization model for an open session.
    fn collaborators(&self, session: Arc<Self::Session>, api_key: &str) -> Result<Collaborators>;

    /// Read the location to search for.
    fn read_query(&self) -> BoxFuture<'_, Result<String>>;
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// No credential; nothing was opened.
    MissingCredential,
    /// The operator entered `quit` or nothing at all.
    Skipped,
    Completed(StateRecord),
    /// Setup or engine failure, already logged.
    Failed(String),
    Cancelled,
}

/// `quit` in any case, or a blank line.
pub fn is_quit(query: &str) -> bool {
    let query = query.trim();
    query.is_empty() || query.eq_ignore_ascii_case("quit")
}

pub struct RunController {
    close_timeout: Duration,
}

impl RunController {
    pub fn new(close_timeout: Duration) -> Self {
        Self { close_timeout }
    }

    pub async fn run<E: RunEnvironment>(&self, env: &E, cancel: CancellationToken) -> RunOutcome {
        let Some(api_key) = env.api_key() else {
            error!("No LLM credential configured");
            return RunOutcome::MissingCredential;
        };

        if cancel.is_cancelled() {
            return RunOutcome::Cancelled;
        }

        let acquired =
            SessionLifecycle::acquire(env.open_session(cancel.clone()), self.close_timeout).await;
        let lifecycle = match acquired {
            Ok(lifecycle) => lifecycle,
            Err(WayfarerError::Cancelled) => {
                warn!("Run cancelled while opening automation session");
                return RunOutcome::Cancelled;
            }
            Err(e) => {
                error!(error = %e, "Failed to open automation session");
                return RunOutcome::Failed(e.to_string());
            }
        };

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!("Run cancelled");
                RunOutcome::Cancelled
            }
            outcome = self.drive(env, lifecycle.session(), &api_key) => outcome,
        };

        lifecycle.release().await;
        outcome
    }

    async fn drive<E: RunEnvironment>(
        &self,
        env: &E,
        session: Arc<E::Session>,
        api_key: &str,
    ) -> RunOutcome {
        let Collaborators { agent, model } = match env.collaborators(session, api_key) {
            Ok(c) => c,
            Err(e) => {
                error!(error = %e, "Failed to build agent");
                return RunOutcome::Failed(e.to_string());
            }
        };

        let query = match env.read_query().await {
            Ok(q) => q,
            Err(e) => {
                error!(error = %e, "Failed to read query");
                return RunOutcome::Failed(e.to_string());
            }
        };
        if is_quit(&query) {
            info!("No query entered");
            return RunOutcome::Skipped;
        }

        let graph = match listing_workflow(agent, model) {
            Ok(g) => g,
            Err(e) => return RunOutcome::Failed(e.to_string()),
        };

        match graph.invoke(StateRecord::new(query.trim())).await {
            Ok(run) => {
                info!(path = ?run.path, elapsed_ms = run.elapsed_ms, "Workflow finished");
                RunOutcome::Completed(run.state)
            }
            Err(e) => {
                error!(error = %e, "Workflow failed");
                RunOutcome::Failed(e.to_string())
            }
        }
    }
}

/// Write the final record for the operator.
pub fn render(record: &StateRecord, out: &mut impl Write) -> std::io::Result<()> {
    writeln!(out, "\n=== Here are the listings for: {} ===", record.input())?;
    for (key, value) in record.fields() {
        writeln!(out, "{key}: {value}\n")?;
    }

    writeln!(out, "\n=== LISTINGS ===")?;
    if record.response().is_empty() {
        writeln!(out, "No listings could be generated")?;
    } else {
        writeln!(out, "{}", record.response())?;
    }

    if !record.summary().is_empty() {
        writeln!(out, "\n=== SUMMARY ===")?;
        writeln!(out, "{}", record.summary())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::StateUpdate;
    use crate::stages::FALLBACK_RESPONSE;
    use std::sync::Mutex;
    use wayfarer_test_utils::{
        goa_listings, CloseBehavior, MockAgent, MockModel, MockSession, Reply,
    };

    struct TestEnv {
        api_key: Option<String>,
        open_fails: bool,
        open_waits_for_cancel: bool,
        collaborators_fail: bool,
        session: MockSession,
        agent: MockAgent,
        model: MockModel,
        query: Mutex<Option<String>>,
    }

    impl TestEnv {
        fn new(query: &str, agent: Reply, model: Reply) -> Self {
            Self {
                api_key: Some("gsk_test".into()),
                open_fails: false,
                open_waits_for_cancel: false,
                collaborators_fail: false,
                session: MockSession::new(CloseBehavior::Ok),
                agent: MockAgent::new(agent),
                model: MockModel::new(model),
                query: Mutex::new(Some(query.to_string())),
            }
        }

        fn goa() -> Self {
            Self::new("Goa", Reply::Text(goa_listings()), Reply::Text("Palm Grove".into()))
        }
    }

    impl RunEnvironment for TestEnv {
        type Session = MockSession;

        fn api_key(&self) -> Option<String> {
            self.api_key.clone()
        }

        fn open_session(&self, cancel: CancellationToken) -> BoxFuture<'_, Result<MockSession>> {
            Box::pin(async move {
                if self.open_waits_for_cancel {
                    cancel.cancelled().await;
                    return Err(WayfarerError::Cancelled);
                }
                if self.open_fails {
                    Err(WayfarerError::Config("no servers".into()))
                } else {
                    Ok(self.session.clone())
                }
            })
        }

        fn collaborators(&self, _session: Arc<MockSession>, _api_key: &str) -> Result<Collaborators> {
            if self.collaborators_fail {
                return Err(WayfarerError::MissingCredential("bad key".into()));
            }
            Ok(Collaborators {
                agent: Arc::new(self.agent.clone()),
                model: Arc::new(self.model.clone()),
            })
        }

        fn read_query(&self) -> BoxFuture<'_, Result<String>> {
            let query = self.query.lock().unwrap().take();
            Box::pin(async move {
                match query {
                    Some(q) => Ok(q),
                    None => futures::future::pending().await,
                }
            })
        }
    }

    fn controller() -> RunController {
        RunController::new(Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_success_closes_once() {
        let env = TestEnv::goa();
        let outcome = controller().run(&env, CancellationToken::new()).await;

        let RunOutcome::Completed(record) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert!(record.is_valid());
        assert_eq!(record.response(), goa_listings());
        assert_eq!(record.summary(), "Palm Grove");
        assert_eq!(env.session.closes().get(), 1);
    }

    #[tokio::test]
    async fn test_agent_failure_still_completes() {
        let env = TestEnv::new("Goa", Reply::Timeout, Reply::Text("unused".into()));
        let outcome = controller().run(&env, CancellationToken::new()).await;

        let RunOutcome::Completed(record) = outcome else {
            panic!("expected completion, got {:?}", outcome);
        };
        assert!(!record.is_valid());
        assert_eq!(record.response(), FALLBACK_RESPONSE);
        assert_eq!(env.model.calls().get(), 0);
        assert_eq!(env.session.closes().get(), 1);
    }

    #[tokio::test]
    async fn test_quit_skips_stages() {
        for query in ["quit", "QUIT", "  Quit ", ""] {
            let env = TestEnv::new(query, Reply::Text("x".into()), Reply::Text("y".into()));
            let outcome = controller().run(&env, CancellationToken::new()).await;
            assert_eq!(outcome, RunOutcome::Skipped);
            assert_eq!(env.agent.calls().get(), 0);
            assert_eq!(env.model.calls().get(), 0);
            assert_eq!(env.session.closes().get(), 1);
        }
    }

    #[tokio::test]
    async fn test_missing_credential_opens_nothing() {
        let mut env = TestEnv::goa();
        env.api_key = None;
        let outcome = controller().run(&env, CancellationToken::new()).await;
        assert_eq!(outcome, RunOutcome::MissingCredential);
        assert_eq!(env.session.closes().get(), 0);
        assert_eq!(env.agent.calls().get(), 0);
    }

    #[tokio::test]
    async fn test_open_failure_has_nothing_to_release() {
        let mut env = TestEnv::goa();
        env.open_fails = true;
        let outcome = controller().run(&env, CancellationToken::new()).await;
        assert!(matches!(outcome, RunOutcome::Failed(ref m) if m.contains("no servers")));
        assert_eq!(env.session.closes().get(), 0);
    }

    #[tokio::test]
    async fn test_setup_failure_after_acquire_releases() {
        let mut env = TestEnv::goa();
        env.collaborators_fail = true;
        let outcome = controller().run(&env, CancellationToken::new()).await;
        assert!(matches!(outcome, RunOutcome::Failed(_)));
        assert_eq!(env.session.closes().get(), 1);
        assert_eq!(env.agent.calls().get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_agent_releases() {
        let env = TestEnv::new("Goa", Reply::Hang, Reply::Text("unused".into()));
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        let calls = env.agent.calls();
        tokio::spawn(async move {
            while calls.get() == 0 {
                tokio::task::yield_now().await;
            }
            trigger.cancel();
        });

        let outcome = controller().run(&env, cancel).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(env.agent.calls().get(), 1);
        assert_eq!(env.model.calls().get(), 0);
        assert_eq!(env.session.closes().get(), 1);
    }

    #[tokio::test]
    async fn test_cancel_during_open_has_nothing_to_release() {
        let mut env = TestEnv::goa();
        env.open_waits_for_cancel = true;
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            trigger.cancel();
        });

        let outcome = controller().run(&env, cancel).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(env.session.closes().get(), 0);
        assert_eq!(env.agent.calls().get(), 0);
    }

    #[tokio::test]
    async fn test_cancel_before_start_opens_nothing() {
        let env = TestEnv::goa();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = controller().run(&env, cancel).await;
        assert_eq!(outcome, RunOutcome::Cancelled);
        assert_eq!(env.session.closes().get(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_close_is_bounded() {
        let mut env = TestEnv::goa();
        env.session = MockSession::new(CloseBehavior::Hang);

        let start = tokio::time::Instant::now();
        let outcome = controller().run(&env, CancellationToken::new()).await;
        assert!(matches!(outcome, RunOutcome::Completed(_)));
        assert_eq!(env.session.closes().get(), 1);
        assert!(start.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn test_is_quit() {
        assert!(is_quit("quit"));
        assert!(is_quit("QuIt"));
        assert!(is_quit("   "));
        assert!(!is_quit("Goa"));
        assert!(!is_quit("quit Goa"));
    }

    fn rendered(record: &StateRecord) -> String {
        let mut out = Vec::new();
        render(record, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_render_full_record() {
        let record = StateRecord::new("Goa").derive(StateUpdate {
            response: Some("L1".into()),
            summary: Some("S1".into()),
            is_valid: Some(true),
        });
        assert_eq!(
            rendered(&record),
            "\n=== Here are the listings for: Goa ===\n\
             input: Goa\n\n\
             response: L1\n\n\
             summary: S1\n\n\
             is_valid: true\n\n\
             \n=== LISTINGS ===\nL1\n\
             \n=== SUMMARY ===\nS1\n"
        );
    }

    #[test]
    fn test_render_without_summary() {
        let out = rendered(&StateRecord::new("Goa"));
        assert!(out.contains("=== LISTINGS ===\nNo listings could be generated\n"));
        assert!(!out.contains("=== SUMMARY ==="));
    }
}
