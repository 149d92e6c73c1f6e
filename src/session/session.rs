use super::config::SessionConfig;
use super::machine::{Action, SessionMachine};
use super::stats::{ChannelStats, MatchRecord, SessionStats};
use crate::audio::{AudioBackend, AudioFrame};
use crate::channel::{
    spawn_channel, AsrProtocol, ChannelEvent, ChannelHandle, ChannelKind, KwsProtocol, LinkState,
};
use crate::nlu::{MatchResult, NluClient};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info, warn};

/// Channel events buffered between the receivers and the session loop
const EVENT_CAPACITY: usize = 64;

type MatchOutcome = (String, Option<String>, Result<MatchResult>);

/// A voice assistant session: capture, wake-word gate, transcription and command matching
///
/// One loop owns the state machine and reacts to four sources in turn:
/// the stop signal, captured frames, channel events and finished NLU matches.
/// Channel receivers and NLU requests run as separate tasks, so neither the
/// network nor the NLU service can stall audio capture.
pub struct AssistantSession {
    /// Session configuration
    config: SessionConfig,

    /// Mode, batchers and transcript
    machine: SessionMachine,

    kws: Option<ChannelHandle>,
    asr: Option<ChannelHandle>,
    kws_up: bool,
    asr_up: bool,

    /// Command matcher, if the NLU stage is enabled
    nlu: Option<Arc<NluClient>>,

    /// Events from both channel receivers, in arrival order
    events_rx: mpsc::Receiver<ChannelEvent>,

    /// In-flight match requests
    matches: JoinSet<MatchOutcome>,

    stats_tx: watch::Sender<SessionStats>,
}

impl AssistantSession {
    /// Upload the command vocabulary and open the recognition channels
    ///
    /// Fails if the NLU service rejects or cannot receive the vocabulary.
    /// KWS and ASR connect in the background and retry on their own.
    pub async fn connect(config: SessionConfig) -> Result<Self> {
        info!("Creating assistant session: {}", config.session_id);

        let nlu = match &config.nlu {
            Some(settings) => {
                let client = NluClient::new(&settings.url, settings.timeout)?;
                client
                    .upload_vocabulary(&settings.vocabulary)
                    .await
                    .context("Failed to upload command vocabulary")?;
                Some(Arc::new(client))
            }
            None => None,
        };

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);

        let kws = config.kws.as_ref().map(|settings| {
            spawn_channel(
                Arc::new(KwsProtocol::new(settings.keywords.clone(), config.sample_rate)),
                settings.endpoint.clone(),
                config.reconnect.clone(),
                events_tx.clone(),
                config.channel_capacity,
            )
        });

        let asr = config.asr.as_ref().map(|settings| {
            spawn_channel(
                Arc::new(AsrProtocol::new(settings.init.clone())),
                settings.endpoint.clone(),
                config.reconnect.clone(),
                events_tx.clone(),
                config.channel_capacity,
            )
        });

        let machine = SessionMachine::new(
            config.kws.as_ref().map(|s| s.window),
            config.asr.as_ref().map(|s| s.window),
            config.idle_retention_frames,
        );

        let mut stats = SessionStats::new(config.session_id.clone(), machine.mode());
        stats.kws.enabled = kws.is_some();
        stats.asr.enabled = asr.is_some();
        let (stats_tx, _) = watch::channel(stats);

        Ok(Self {
            config,
            machine,
            kws,
            asr,
            kws_up: false,
            asr_up: false,
            nlu,
            events_rx,
            matches: JoinSet::new(),
            stats_tx,
        })
    }

    /// Live statistics, updated as the session runs
    pub fn subscribe(&self) -> watch::Receiver<SessionStats> {
        self.stats_tx.subscribe()
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    /// Run until `shutdown` turns true, the audio source ends, or a fatal error
    pub async fn run(
        mut self,
        mut backend: Box<dyn AudioBackend>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<SessionStats> {
        let mut frames = match backend.start().await {
            Ok(frames) => frames,
            Err(e) => {
                self.close_channels().await;
                return Err(e).with_context(|| format!("Failed to start {} capture", backend.name()));
            }
        };

        info!(
            "Session {} running on {} (mode: {:?})",
            self.config.session_id,
            backend.name(),
            self.machine.mode()
        );
        self.stats_tx.send_modify(|stats| stats.is_running = true);

        let outcome = loop {
            tokio::select! {
                _ = shutdown.wait_for(|stop| *stop) => {
                    info!("Stop requested");
                    break Ok(());
                }
                frame = frames.recv() => match frame {
                    Some(frame) => self.handle_frame(frame),
                    None => {
                        info!("Audio source {} ended", backend.name());
                        break Ok(());
                    }
                },
                Some(event) = self.events_rx.recv() => {
                    if let Err(e) = self.handle_event(event) {
                        break Err(e);
                    }
                }
                Some(joined) = self.matches.join_next(), if !self.matches.is_empty() => {
                    self.handle_match(joined);
                }
            }
        };

        if let Err(e) = backend.stop().await {
            error!("Failed to stop audio backend: {}", e);
        }
        // Pending matches and queued batches are discarded
        self.matches.abort_all();
        self.close_channels().await;
        self.stats_tx.send_modify(|stats| stats.is_running = false);

        info!("Session {} stopped", self.config.session_id);

        outcome?;
        let stats = self.stats_tx.borrow().clone();
        Ok(stats)
    }

    async fn close_channels(&mut self) {
        for handle in [self.kws.take(), self.asr.take()].into_iter().flatten() {
            handle.close().await;
        }
    }

    fn handle(&self, kind: ChannelKind) -> Option<&ChannelHandle> {
        match kind {
            ChannelKind::Kws => self.kws.as_ref(),
            ChannelKind::Asr => self.asr.as_ref(),
        }
    }

    fn is_up(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Kws => self.kws_up,
            ChannelKind::Asr => self.asr_up,
        }
    }

    fn handle_frame(&mut self, frame: AudioFrame) {
        let delivery = self.machine.push_frame(frame).map(|(kind, batch)| {
            let sent = self.is_up(kind) && self.handle(kind).is_some_and(|h| h.try_send(batch));
            (kind, sent)
        });

        let kws_queued = self.machine.queued_frames(ChannelKind::Kws);
        let asr_queued = self.machine.queued_frames(ChannelKind::Asr);

        self.stats_tx.send_modify(|stats| {
            stats.frames_captured += 1;
            stats.kws.queued_frames = kws_queued;
            stats.asr.queued_frames = asr_queued;
            if let Some((kind, sent)) = delivery {
                let channel = channel_stats(stats, kind);
                if sent {
                    channel.batches_sent += 1;
                } else {
                    channel.batches_dropped += 1;
                }
            }
        });
    }

    fn handle_event(&mut self, event: ChannelEvent) -> Result<()> {
        match event {
            ChannelEvent::Link(kind, state) => self.handle_link(kind, state)?,
            ChannelEvent::Kws(event) => {
                let action = self.machine.on_kws(&event);
                self.apply(action);
            }
            ChannelEvent::Asr(event) => {
                let action = self.machine.on_asr(&event);
                self.apply(action);
            }
        }

        self.publish_state();
        Ok(())
    }

    fn handle_link(&mut self, kind: ChannelKind, state: LinkState) -> Result<()> {
        let up = state == LinkState::Up;
        match kind {
            ChannelKind::Kws => self.kws_up = up,
            ChannelKind::Asr => self.asr_up = up,
        }

        self.stats_tx.send_modify(|stats| {
            let channel = channel_stats(stats, kind);
            channel.connected = up;
            if state == LinkState::Down {
                channel.disconnects += 1;
            }
        });

        match state {
            LinkState::Up => info!("{} channel ready", kind),
            LinkState::Down => warn!("{} channel down, reconnecting", kind),
            LinkState::Failed => bail!("{} channel lost and reconnect is disabled", kind),
        }
        Ok(())
    }

    fn apply(&mut self, action: Action) {
        match action {
            Action::None => {}
            Action::Woke { assistant } => {
                println!("\n[{}]: I'm listening", assistant);
                self.stats_tx.send_modify(|stats| stats.wake_count += 1);
            }
            Action::Detected { phrase } => {
                println!("\n[Keyword detected]: {}", phrase);
                self.stats_tx.send_modify(|stats| stats.wake_count += 1);
            }
            Action::Partial { text } => {
                print!("\r[me]: {}", text);
                std::io::Write::flush(&mut std::io::stdout()).ok();
            }
            Action::Command { text } => {
                println!("\r[me]: {}", text);
                self.stats_tx.send_modify(|stats| stats.command_count += 1);
                self.dispatch_match(text);
            }
        }
    }

    fn dispatch_match(&mut self, text: String) {
        if text.is_empty() {
            info!("Empty transcript, nothing to match");
            return;
        }

        let Some(nlu) = &self.nlu else {
            info!("Transcript: {}", text);
            return;
        };

        let client = Arc::clone(nlu);
        let assistant = self.machine.assistant().map(str::to_string);
        self.matches.spawn(async move {
            let result = client.match_sentence(&text).await;
            (text, assistant, result)
        });
    }

    fn handle_match(&mut self, joined: Result<MatchOutcome, JoinError>) {
        match joined {
            Ok((text, assistant, Ok(result))) => {
                println!(
                    "[{}]: matched command <{}>, score: {}",
                    assistant.as_deref().unwrap_or("assistant"),
                    result.best_match,
                    result.score
                );
                let record = MatchRecord {
                    text,
                    assistant,
                    result,
                    matched_at: Utc::now(),
                };
                let limit = self.config.recent_matches;
                self.stats_tx
                    .send_modify(|stats| stats.record_match(record, limit));
            }
            Ok((text, _, Err(e))) => {
                warn!("Failed to match '{}': {:#}", text, e);
                self.stats_tx.send_modify(|stats| stats.failed_matches += 1);
            }
            Err(e) => {
                error!("Match task failed: {}", e);
                self.stats_tx.send_modify(|stats| stats.failed_matches += 1);
            }
        }
    }

    fn publish_state(&self) {
        let mode = self.machine.mode();
        let assistant = self.machine.assistant().map(str::to_string);
        let transcript = self.machine.transcript().to_string();
        let kws_queued = self.machine.queued_frames(ChannelKind::Kws);
        let asr_queued = self.machine.queued_frames(ChannelKind::Asr);

        self.stats_tx.send_modify(|stats| {
            stats.mode = mode;
            stats.assistant = assistant;
            stats.transcript = transcript;
            stats.kws.queued_frames = kws_queued;
            stats.asr.queued_frames = asr_queued;
        });
    }
}

fn channel_stats(stats: &mut SessionStats, kind: ChannelKind) -> &mut ChannelStats {
    match kind {
        ChannelKind::Kws => &mut stats.kws,
        ChannelKind::Asr => &mut stats.asr,
    }
}
