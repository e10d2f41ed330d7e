//! Remote control bot
//!
//! Two loops share one [`BotState`] behind a single lock:
//! - the command loop long-polls the transport and routes operator messages
//! - the output relay loop mirrors the screen into the live message slot
//!
//! The lock is never held across a transport call. The relay loop takes the
//! slots out, talks to the transport, and puts them back only if no operator
//! input arrived in between.
//!
//! Both stop when the session is no longer alive or their token is cancelled.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::commands::BotCommand;
use super::format::{self, HELP_TEXT};
use super::slots::{IdleNoticeSlot, LiveMessageSlot};
use super::transport::{Attachment, IncomingContent, IncomingMessage, RemoteTransport};
use crate::classifier::{NotificationKind, SharedClassifier, display_lines};
use crate::config::{ChatId, Config, Owner, OwnerStore};
use crate::error::{Result, SessionError};
use crate::session::SessionBackend;
use crate::session::relay::tick;
use crate::tmux::content_hash;

/// Wait after a failed poll before trying again
const POLL_BACKOFF: Duration = Duration::from_secs(5);

/// Timing and storage knobs for the bot
#[derive(Debug, Clone)]
pub struct BotSettings {
    /// Quiet time before an inactivity notice; zero disables it
    pub idle_threshold: Duration,
    /// Output relay cadence
    pub relay_interval: Duration,
    pub poll_timeout: Duration,
    pub download_dir: PathBuf,
}

impl BotSettings {
    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            idle_threshold: config.idle_threshold(),
            relay_interval: config.notification_interval(),
            poll_timeout: config.poll_timeout(),
            download_dir: config.download_dir()?,
        })
    }
}

/// State written by both loops
#[derive(Debug)]
pub struct BotState {
    owner: Option<Owner>,
    live: LiveMessageSlot,
    idle_notice: IdleNoticeSlot,
    last_activity: Instant,
    idle_notified_at: Option<Instant>,
    /// Last approval alert, keyed by screen content
    last_approval: Option<u64>,
    /// Bumped by every operator input
    input_generation: u64,
}

impl BotState {
    fn new(owner: Option<Owner>, now: Instant) -> Self {
        Self {
            owner,
            live: LiveMessageSlot::default(),
            idle_notice: IdleNoticeSlot::default(),
            last_activity: now,
            idle_notified_at: None,
            last_approval: None,
            input_generation: 0,
        }
    }

    pub fn owner(&self) -> Option<&Owner> {
        self.owner.as_ref()
    }

    fn mark_activity(&mut self, now: Instant) {
        self.last_activity = now;
        self.idle_notified_at = None;
    }

    fn idle_notice_due(&self, threshold: Duration, now: Instant) -> bool {
        if threshold.is_zero() || now.duration_since(self.last_activity) < threshold {
            return false;
        }
        self.idle_notified_at
            .is_none_or(|at| now.duration_since(at) >= threshold)
    }
}

/// What one relay iteration sends
enum RelayAction {
    ShowOutput,
    /// Seconds without new output
    NoticeIdle(u64),
    Nothing,
}

/// Bot driving one session on behalf of its owner
pub struct RemoteControlBot {
    transport: Arc<dyn RemoteTransport>,
    backend: Arc<dyn SessionBackend>,
    classifier: Option<SharedClassifier>,
    owners: OwnerStore,
    settings: BotSettings,
    state: Mutex<BotState>,
    restart_requested: Arc<AtomicBool>,
}

impl RemoteControlBot {
    /// Create the bot, loading a previously claimed owner if one exists
    pub fn new(
        transport: Arc<dyn RemoteTransport>,
        backend: Arc<dyn SessionBackend>,
        classifier: Option<SharedClassifier>,
        owners: OwnerStore,
        settings: BotSettings,
    ) -> Result<Self> {
        let owner = owners.load()?;
        if let Some(owner) = &owner {
            info!("Bot owned by chat {}", owner.chat_id);
        } else {
            info!("Bot unclaimed; the first /start claims it");
        }

        Ok(Self {
            transport,
            backend,
            classifier,
            owners,
            settings,
            state: Mutex::new(BotState::new(owner, Instant::now())),
            restart_requested: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag raised by `/restart`
    pub fn restart_flag(&self) -> Arc<AtomicBool> {
        self.restart_requested.clone()
    }

    pub fn restart_requested(&self) -> bool {
        self.restart_requested.load(Ordering::SeqCst)
    }

    pub async fn owner(&self) -> Option<ChatId> {
        self.state.lock().await.owner().map(|o| o.chat_id)
    }

    /// Start the command loop and the output relay loop
    pub fn spawn(self: Arc<Self>, cancel: &CancellationToken) -> Vec<JoinHandle<()>> {
        let commands = tokio::spawn(self.clone().run_commands(cancel.child_token()));
        let relay = tokio::spawn(self.run_relay(cancel.child_token()));
        vec![commands, relay]
    }

    async fn run_commands(self: Arc<Self>, cancel: CancellationToken) {
        let mut offset = 0;
        loop {
            if !self.backend.is_alive().await {
                debug!("Session gone, command loop stopping");
                break;
            }

            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = self.transport.poll(offset, self.settings.poll_timeout) => polled,
            };

            match polled {
                Ok(batch) => {
                    if let Some(next) = batch.next_offset {
                        offset = next;
                    }
                    for message in batch.messages {
                        if let Err(e) = self.handle_message(message).await {
                            warn!("Failed to handle message: {}", e);
                        }
                    }
                }
                Err(e) => {
                    warn!("Polling failed: {}", e);
                    if !tick(&cancel, POLL_BACKOFF).await {
                        break;
                    }
                }
            }
        }
    }

    async fn run_relay(self: Arc<Self>, cancel: CancellationToken) {
        while tick(&cancel, self.settings.relay_interval).await {
            if !self.backend.is_alive().await {
                debug!("Session gone, output relay stopping");
                break;
            }
            if let Err(e) = self.relay_once(Instant::now()).await {
                warn!("Output relay: {}", e);
            }
        }
    }

    /// Route one operator message
    #[instrument(skip(self, message), fields(chat_id = message.chat_id))]
    pub async fn handle_message(&self, message: IncomingMessage) -> Result<()> {
        let chat_id = message.chat_id;

        let command = match message.content {
            IncomingContent::Text(text) => BotCommand::parse(&text),
            IncomingContent::Attachment(attachment) => {
                if self.authorize(chat_id).await? {
                    self.handle_attachment(chat_id, attachment).await?;
                }
                return Ok(());
            }
        };

        if command == BotCommand::Claim {
            return self.claim(chat_id).await;
        }
        if !self.authorize(chat_id).await? {
            return Ok(());
        }

        match command {
            BotCommand::Claim => Ok(()),
            BotCommand::Help => self.reply(chat_id, HELP_TEXT).await,
            BotCommand::Unknown(token) => {
                let text = format!("Unknown command {}\n\n{}", format::escape_html(&token), HELP_TEXT);
                self.reply(chat_id, &text).await
            }
            BotCommand::Output => {
                let raw = self.backend.capture().await?;
                let lines = display_lines(self.classifier.as_ref(), &raw).await;
                let block = lines.join("\n");
                if block.trim().is_empty() {
                    self.reply(chat_id, "<i>(no output)</i>").await
                } else {
                    self.reply(chat_id, &format::pre_block(&block)).await
                }
            }
            BotCommand::Enter => {
                self.backend.send_enter().await?;
                self.reset_after_input(chat_id).await;
                Ok(())
            }
            BotCommand::Input(text) => {
                self.backend.send_line(&text).await?;
                self.reset_after_input(chat_id).await;
                Ok(())
            }
            BotCommand::Kill => match self.backend.interrupt().await {
                Ok(()) => self.reply(chat_id, "Interrupt sent.").await,
                Err(crate::error::Error::Session(SessionError::NotRunning)) => {
                    self.reply(chat_id, "No running process.").await
                }
                Err(e) => Err(e),
            },
            BotCommand::Restart => {
                self.reply(chat_id, "Restarting...").await?;
                info!("Restart requested by chat {}", chat_id);
                self.restart_requested.store(true, Ordering::SeqCst);
                self.backend.terminate().await
            }
        }
    }

    async fn claim(&self, chat_id: ChatId) -> Result<()> {
        let mut state = self.state.lock().await;
        match state.owner.as_ref().map(|o| o.chat_id) {
            Some(owner) if owner == chat_id => {
                drop(state);
                self.reply(chat_id, HELP_TEXT).await
            }
            Some(_) => {
                drop(state);
                warn!("Chat {} tried to claim an owned bot", chat_id);
                self.reply(chat_id, "This bot is already claimed.").await
            }
            None => {
                let owner = Owner::new(chat_id);
                if let Err(e) = self.owners.save(&owner) {
                    warn!("Could not persist owner: {}", e);
                }
                state.owner = Some(owner);
                drop(state);
                info!("Bot claimed by chat {}", chat_id);
                let text = format!("Bot claimed. You control this session.\n\n{}", HELP_TEXT);
                self.reply(chat_id, &text).await
            }
        }
    }

    /// Answer non-owners and report whether `chat_id` may proceed
    async fn authorize(&self, chat_id: ChatId) -> Result<bool> {
        let owner = self.state.lock().await.owner.as_ref().map(|o| o.chat_id);
        match owner {
            Some(owner) if owner == chat_id => Ok(true),
            Some(_) => {
                debug!("Rejected chat {}", chat_id);
                self.reply(chat_id, "Unauthorized.").await?;
                Ok(false)
            }
            None => {
                self.reply(chat_id, "This bot is not claimed yet. Send /start to claim it.")
                    .await?;
                Ok(false)
            }
        }
    }

    async fn handle_attachment(&self, chat_id: ChatId, attachment: Attachment) -> Result<()> {
        let dest = self.settings.download_dir.join(attachment.local_name());
        let saved = self
            .transport
            .download_file(&attachment.file_id, &dest)
            .await?;
        info!("Saved {} to {:?}", attachment.kind, saved);

        let translated = match &self.classifier {
            Some(classifier) => classifier.lock().await.translate_attachment(&saved),
            None => None,
        };

        match translated {
            Some(command) => {
                self.backend.send_line(&command).await?;
                self.reset_after_input(chat_id).await;
                Ok(())
            }
            None => {
                let text = format!(
                    "Saved {} to <code>{}</code>, but no handler accepts files for this program.",
                    attachment.kind,
                    format::escape_html(&saved.display().to_string())
                );
                self.reply(chat_id, &text).await
            }
        }
    }

    /// Operator input makes the next screen a fresh reply below their message
    async fn reset_after_input(&self, chat_id: ChatId) {
        if let Some(classifier) = &self.classifier {
            classifier.lock().await.on_user_input();
        }
        let mut stale_notice = {
            let mut state = self.state.lock().await;
            state.mark_activity(Instant::now());
            state.live.reset();
            state.last_approval = None;
            state.input_generation += 1;
            std::mem::take(&mut state.idle_notice)
        };
        stale_notice.retract(self.transport.as_ref(), chat_id).await;
    }

    /// One output relay iteration at `now`
    pub async fn relay_once(&self, now: Instant) -> Result<()> {
        let raw = self.backend.capture().await?;
        let block = display_lines(self.classifier.as_ref(), &raw).await.join("\n");
        let alerts = match &self.classifier {
            Some(classifier) => classifier.lock().await.check_for_notifications_at(
                &raw,
                self.settings.idle_threshold,
                now,
            ),
            None => Vec::new(),
        };

        let transport = self.transport.as_ref();
        let (chat_id, generation, action, alerts, mut live, mut idle_notice) = {
            let mut state = self.state.lock().await;
            let Some(chat_id) = state.owner.as_ref().map(|o| o.chat_id) else {
                return Ok(());
            };

            let action = if !block.trim().is_empty() && state.live.is_stale(&block) {
                state.mark_activity(now);
                RelayAction::ShowOutput
            } else if state.idle_notice_due(self.settings.idle_threshold, now) {
                state.idle_notified_at = Some(now);
                RelayAction::NoticeIdle(now.duration_since(state.last_activity).as_secs())
            } else {
                RelayAction::Nothing
            };

            let hash = content_hash(&block);
            let mut fresh_alerts = Vec::new();
            for kind in alerts {
                if kind == NotificationKind::NeedsApproval {
                    if state.last_approval == Some(hash) {
                        continue;
                    }
                    state.last_approval = Some(hash);
                }
                fresh_alerts.push(kind);
            }

            (
                chat_id,
                state.input_generation,
                action,
                fresh_alerts,
                std::mem::take(&mut state.live),
                std::mem::take(&mut state.idle_notice),
            )
        };

        let shown = match action {
            RelayAction::ShowOutput => {
                idle_notice.retract(transport, chat_id).await;
                live.update(transport, chat_id, &block).await.map(|_| ())
            }
            RelayAction::NoticeIdle(idle_for) => {
                let text = format!("💤 No new output for {idle_for}s.");
                idle_notice.replace(transport, chat_id, &text).await
            }
            RelayAction::Nothing => Ok(()),
        };
        self.restore_slots(chat_id, generation, live, idle_notice).await;
        shown?;

        for kind in alerts {
            info!("Notifying owner: {}", kind);
            transport.send_message(chat_id, kind.message()).await?;
        }

        Ok(())
    }

    /// Put the relay's slots back unless operator input superseded them
    async fn restore_slots(
        &self,
        chat_id: ChatId,
        generation: u64,
        live: LiveMessageSlot,
        mut idle_notice: IdleNoticeSlot,
    ) {
        {
            let mut state = self.state.lock().await;
            if state.input_generation == generation {
                state.live = live;
                state.idle_notice = idle_notice;
                return;
            }
        }
        debug!("Operator input during relay, dropping its slots");
        idle_notice.retract(self.transport.as_ref(), chat_id).await;
    }

    async fn reply(&self, chat_id: ChatId, html: &str) -> Result<()> {
        self.transport.send_message(chat_id, html).await?;
        Ok(())
    }
}
