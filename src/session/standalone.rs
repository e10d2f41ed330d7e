//! Single-shot mode: run the program as a plain child process

use std::sync::Arc;
use std::sync::atomic::Ordering;

use futures::future::join_all;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{LaunchOptions, ProcessOptions, ProcessSession, RunOutcome, SessionBackend};
use crate::bot::build_bot;
use crate::classifier::ClassifierRegistry;
use crate::config::Config;
use crate::error::Result;

/// Run `command` without tmux until it exits or `cancel` fires
///
/// Output lines are echoed to stdout and local stdin lines are forwarded to
/// the program.
pub async fn run_single_shot(
    config: &Config,
    command: &str,
    options: &LaunchOptions,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    let (echo_tx, mut echo_rx) = mpsc::unbounded_channel::<String>();
    let process_options = ProcessOptions {
        working_dir: options.working_dir.clone(),
        env: options.env.clone(),
    };
    let process = Arc::new(ProcessSession::spawn(command, &process_options, Some(echo_tx))?);

    let printer = tokio::spawn(async move {
        while let Some(line) = echo_rx.recv().await {
            println!("{}", line);
        }
    });

    let mut handles = vec![tokio::spawn(forward_stdin(
        process.clone(),
        cancel.child_token(),
    ))];

    let mut restart = None;
    if options.enable_bot {
        let classifier = ClassifierRegistry::default().select_shared(command);
        let backend: Arc<dyn SessionBackend> = process.clone();
        match build_bot(config, backend, classifier) {
            Ok(Some(bot)) => {
                restart = Some(bot.restart_flag());
                handles.extend(bot.spawn(&cancel));
            }
            Ok(None) => {}
            Err(e) => warn!("Remote control disabled: {}", e),
        }
    }

    let exit_code = tokio::select! {
        code = process.wait() => code,
        _ = cancel.cancelled() => {
            info!("Interrupted, stopping '{}'", command);
            if let Err(e) = process.kill() {
                debug!("Kill failed: {}", e);
            }
            process.wait().await
        }
    };

    cancel.cancel();
    join_all(handles).await;
    // Readers close the echo channel once the pipes reach EOF
    drop(process);
    let _ = printer.await;

    Ok(RunOutcome {
        exit_code,
        restart_requested: restart.is_some_and(|flag| flag.load(Ordering::SeqCst)),
    })
}

async fn forward_stdin(process: Arc<ProcessSession>, cancel: CancellationToken) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        match line {
            Ok(Some(line)) => process.write(&format!("{}\n", line)).await,
            Ok(None) => {
                debug!("Local stdin closed");
                process.close_stdin().await;
                break;
            }
            Err(e) => {
                debug!("Local stdin error: {}", e);
                break;
            }
        }
    }
}
