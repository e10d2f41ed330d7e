//! Session orchestrator - owns the tmux session for one run
//!
//! Lifecycle:
//! 1. Verify tmux, replace any stale session of the same name
//! 2. Create the session with its options in one tmux invocation
//! 3. Report and return early if the program already exited
//! 4. Start the input relay, output capture and bot daemons
//! 5. Attach the operator (or wait headless) until the session ends
//! 6. Cancel the daemons and destroy the session

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::relay::{InputRelay, OutputCapture, tick};
use super::{Session, SessionBackend, SessionPhase, TmuxBackend};
use crate::bot::build_bot;
use crate::classifier::{ClassifierRegistry, SharedClassifier};
use crate::config::Config;
use crate::error::{Error, Result, SessionError, TmuxError};
use crate::tmux::{SessionOptions, TmuxExecutor, attach_to_session, can_attach};

/// Exit code reported when the run is interrupted by a signal
pub const INTERRUPTED_EXIT_CODE: i32 = 130;

/// How the wrapped program is launched and watched
#[derive(Debug, Clone, Default)]
pub struct LaunchOptions {
    pub working_dir: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    /// Wait for the session to end instead of attaching the terminal
    pub headless: bool,
    /// Start the remote control bot
    pub enable_bot: bool,
}

/// Result of a completed run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub exit_code: i32,
    /// The operator asked for a restart from the bot
    pub restart_requested: bool,
}

/// Tasks started for a running session
#[derive(Default)]
struct Daemons {
    handles: Vec<JoinHandle<()>>,
    restart: Option<Arc<AtomicBool>>,
}

/// Drives one tmux-hosted run of the wrapped program
pub struct SessionOrchestrator {
    config: Arc<Config>,
    tmux: TmuxExecutor,
    session: Session,
    options: LaunchOptions,
    classifier: Option<SharedClassifier>,
    cancel: CancellationToken,
}

impl SessionOrchestrator {
    pub fn new(config: Arc<Config>, command: &str, options: LaunchOptions) -> Result<Self> {
        let session = Session::new(config.session_name.clone(), command)?;
        let tmux = TmuxExecutor::with_max_concurrent(config.max_concurrent_tmux)
            .with_timeout(config.tmux_timeout());

        let classifier = ClassifierRegistry::default().select_shared(command);
        match &classifier {
            Some(_) => info!("Using output classifier for '{}'", command),
            None => debug!("No classifier matches '{}', using plain output", command),
        }

        Ok(Self {
            config,
            tmux,
            session,
            options,
            classifier,
            cancel: CancellationToken::new(),
        })
    }

    /// Token that stops the run; cancelling it tears the session down
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Run the program to completion
    #[instrument(skip(self), fields(session = %self.session.name))]
    pub async fn run(&mut self) -> Result<RunOutcome> {
        self.tmux.check_installed().await?;

        let name = self.session.name.clone();
        if self.tmux.session_exists(&name).await? {
            info!("Replacing stale session {}", name);
            self.tmux.kill_session(&name).await?;
        }

        // From here on the session may exist, so every exit path tears it down
        let mut daemons = Daemons::default();
        let result = self.drive_session(&mut daemons).await;

        self.session.set_phase(SessionPhase::Draining);
        self.cancel.cancel();
        if let Err(e) = self.tmux.kill_session(&name).await {
            debug!("Session already gone: {}", e);
        }
        join_all(daemons.handles).await;
        self.session.set_phase(SessionPhase::Terminated);

        let restart_requested = daemons
            .restart
            .is_some_and(|flag| flag.load(Ordering::SeqCst));
        let exit_code = result?;
        info!("Session {} finished with code {}", name, exit_code);
        Ok(RunOutcome {
            exit_code,
            restart_requested,
        })
    }

    /// Create the session, start the daemons and wait for the program to end
    async fn drive_session(&mut self, daemons: &mut Daemons) -> Result<i32> {
        let name = self.session.name.clone();
        self.tmux
            .create_session(&name, &self.session.command, &self.session_options())
            .await
            .map_err(|e| SessionError::StartFailed(e.to_string()))?;
        info!("Started '{}' in tmux session {}", self.session.command, name);

        tokio::time::sleep(self.config.settle_delay()).await;
        if self.tmux.is_pane_dead(&name).await? {
            return Ok(self.report_early_exit().await);
        }

        if !self.options.headless {
            self.tmux.set_exit_hook(&name).await?;
            // The program may have exited before the hook was in place
            if self.tmux.is_pane_dead(&name).await? {
                return Ok(self.report_early_exit().await);
            }
        }
        self.session.set_phase(SessionPhase::Running);

        let backend: Arc<dyn SessionBackend> =
            Arc::new(TmuxBackend::new(self.tmux.clone(), name));
        self.spawn_daemons(backend, daemons).await?;

        self.wait_for_exit().await
    }

    fn session_options(&self) -> SessionOptions {
        SessionOptions {
            history_limit: self.config.history_limit,
            status_position: self.config.status_position.clone(),
            working_dir: self.options.working_dir.clone(),
            env: self.options.env.clone(),
            ..SessionOptions::default()
        }
    }

    /// The program exited during startup: show what it printed and its status
    async fn report_early_exit(&self) -> i32 {
        let name = &self.session.name;
        let history = self.tmux.capture_history(name).await.unwrap_or_default();
        let exit_code = self.exit_status_or_failure().await;

        let output = history.trim_end();
        if !output.is_empty() {
            println!("{}", output);
        }
        warn!("'{}' exited during startup with code {}", self.session.command, exit_code);
        exit_code
    }

    async fn exit_status_or_failure(&self) -> i32 {
        match self.tmux.pane_exit_status(&self.session.name).await {
            Ok(code) => code,
            Err(e) => {
                warn!("Exit status unavailable: {}", e);
                1
            }
        }
    }

    async fn spawn_daemons(
        &self,
        backend: Arc<dyn SessionBackend>,
        daemons: &mut Daemons,
    ) -> Result<()> {
        let handles = &mut daemons.handles;

        let input = InputRelay::new(
            self.config.input_file()?,
            self.config.input_relay_interval(),
            backend.clone(),
            self.classifier.clone(),
        )
        .await;
        handles.push(tokio::spawn(input.run(self.cancel.child_token())));

        let output = OutputCapture::new(
            self.config.output_file()?,
            self.config.output_capture_interval(),
            backend.clone(),
            self.classifier.clone(),
        );
        handles.push(tokio::spawn(output.run(self.cancel.child_token())));

        if self.options.enable_bot {
            match build_bot(&self.config, backend, self.classifier.clone()) {
                Ok(Some(bot)) => {
                    daemons.restart = Some(bot.restart_flag());
                    daemons.handles.extend(bot.spawn(&self.cancel));
                }
                Ok(None) => {}
                Err(e) => warn!("Remote control disabled: {}", e),
            }
        }

        Ok(())
    }

    async fn wait_for_exit(&self) -> Result<i32> {
        if !self.options.headless && can_attach() {
            let attach = async {
                attach_to_session(&self.session.name)
                    .await
                    .map(|result| result.exit_code())
            };
            return until_cancelled(&self.cancel, attach).await;
        }

        if !self.options.headless {
            info!("stdin is not a terminal, running headless");
        }
        self.wait_headless().await
    }

    /// Poll until the pane dies and report its exit status
    async fn wait_headless(&self) -> Result<i32> {
        let name = &self.session.name;
        let interval = self.config.output_capture_interval();

        while tick(&self.cancel, interval).await {
            match self.check_pane().await {
                Ok(true) => return Ok(self.exit_status_or_failure().await),
                Ok(false) => {}
                Err(Error::Tmux(TmuxError::SessionNotFound(_))) => {
                    warn!("Session {} disappeared", name);
                    return Ok(1);
                }
                Err(e) => debug!("Pane check failed: {}", e),
            }
        }
        Ok(INTERRUPTED_EXIT_CODE)
    }

    async fn check_pane(&self) -> Result<bool> {
        let name = &self.session.name;
        match self.tmux.is_pane_dead(name).await {
            Err(e) if !self.tmux.session_exists(name).await.unwrap_or(true) => {
                debug!("Pane check failed: {}", e);
                Err(TmuxError::SessionNotFound(name.clone()).into())
            }
            other => other,
        }
    }
}

/// Await `wait`, or report an interrupted run once `cancel` fires
async fn until_cancelled<F>(cancel: &CancellationToken, wait: F) -> Result<i32>
where
    F: Future<Output = Result<i32>>,
{
    tokio::select! {
        code = wait => code,
        _ = cancel.cancelled() => {
            info!("Interrupted, leaving the session");
            Ok(INTERRUPTED_EXIT_CODE)
        }
    }
}
