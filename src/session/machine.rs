use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::audio::{AudioBatch, AudioFrame, BatchWindow, ChunkBatcher};
use crate::channel::{AsrEvent, AsrPhase, ChannelKind, KwsEvent};

/// Which service the live audio is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionMode {
    ListeningForKeyword,
    Transcribing,
}

impl SessionMode {
    pub fn channel(self) -> ChannelKind {
        match self {
            SessionMode::ListeningForKeyword => ChannelKind::Kws,
            SessionMode::Transcribing => ChannelKind::Asr,
        }
    }
}

/// What the orchestrator should do after an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Nothing changed
    None,
    /// Wake phrase detected, now transcribing
    Woke { assistant: String },
    /// Wake phrase detected with no transcription stage
    Detected { phrase: String },
    /// Accumulated partial transcript for display
    Partial { text: String },
    /// Utterance finished; normalized text to match
    Command { text: String },
}

/// Session state: mode, both batchers and the transcript in progress
///
/// All mutation goes through `&mut self`, so a transition and the queue
/// clear that goes with it can never interleave with a frame push.
#[derive(Debug)]
pub struct SessionMachine {
    mode: SessionMode,
    kws: Option<ChunkBatcher>,
    asr: Option<ChunkBatcher>,
    idle_retention_frames: usize,
    transcript: String,
    assistant: Option<String>,
}

impl SessionMachine {
    /// Build a machine for the enabled stages; at least one window is expected
    pub fn new(
        kws_window: Option<BatchWindow>,
        asr_window: Option<BatchWindow>,
        idle_retention_frames: usize,
    ) -> Self {
        let mode = if kws_window.is_some() {
            SessionMode::ListeningForKeyword
        } else {
            SessionMode::Transcribing
        };

        Self {
            mode,
            kws: kws_window.map(ChunkBatcher::new),
            asr: asr_window.map(ChunkBatcher::new),
            idle_retention_frames,
            transcript: String::new(),
            assistant: None,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    /// Wake phrase of the last detection
    pub fn assistant(&self) -> Option<&str> {
        self.assistant.as_deref()
    }

    /// Partial transcript accumulated for the current utterance
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    pub fn queued_frames(&self, kind: ChannelKind) -> usize {
        self.batcher(kind).map_or(0, ChunkBatcher::queued_frames)
    }

    fn batcher(&self, kind: ChannelKind) -> Option<&ChunkBatcher> {
        match kind {
            ChannelKind::Kws => self.kws.as_ref(),
            ChannelKind::Asr => self.asr.as_ref(),
        }
    }

    fn batcher_mut(&mut self, kind: ChannelKind) -> Option<&mut ChunkBatcher> {
        match kind {
            ChannelKind::Kws => self.kws.as_mut(),
            ChannelKind::Asr => self.asr.as_mut(),
        }
    }

    /// Mode the session returns to after an utterance
    fn idle_mode(&self) -> SessionMode {
        if self.kws.is_some() {
            SessionMode::ListeningForKeyword
        } else {
            SessionMode::Transcribing
        }
    }

    /// Feed a captured frame to every batcher and return the batch to transmit, if any
    pub fn push_frame(&mut self, frame: AudioFrame) -> Option<(ChannelKind, AudioBatch)> {
        let active = self.mode.channel();
        let retention = self.idle_retention_frames;

        match (&mut self.kws, &mut self.asr) {
            (Some(kws), Some(asr)) => {
                kws.push(frame.clone());
                asr.push(frame);
            }
            (Some(kws), None) => kws.push(frame),
            (None, Some(asr)) => asr.push(frame),
            (None, None) => return None,
        }

        let inactive = match active {
            ChannelKind::Kws => ChannelKind::Asr,
            ChannelKind::Asr => ChannelKind::Kws,
        };
        if let Some(idle) = self.batcher_mut(inactive) {
            idle.retain_newest(retention);
        }

        self.batcher_mut(active)
            .and_then(ChunkBatcher::try_take_batch)
            .map(|batch| (active, batch))
    }

    pub fn on_kws(&mut self, event: &KwsEvent) -> Action {
        if !event.is_detection() {
            debug!("KWS status {:?} for '{}'", event.status, event.phrase);
            return Action::None;
        }

        if self.mode != SessionMode::ListeningForKeyword {
            debug!("Ignoring KWS detection '{}' while transcribing", event.phrase);
            return Action::None;
        }

        self.assistant = Some(event.phrase.clone());

        if self.asr.is_none() {
            return Action::Detected {
                phrase: event.phrase.clone(),
            };
        }

        self.transition(SessionMode::Transcribing);
        Action::Woke {
            assistant: event.phrase.clone(),
        }
    }

    pub fn on_asr(&mut self, event: &AsrEvent) -> Action {
        if self.mode != SessionMode::Transcribing {
            debug!(
                "Ignoring {:?} ASR result while listening: {}",
                event.phase, event.text
            );
            return Action::None;
        }

        match event.phase {
            AsrPhase::Partial => {
                self.transcript.push_str(&event.text);
                Action::Partial {
                    text: self.transcript.clone(),
                }
            }
            AsrPhase::Final => {
                let text = event.command_text();
                let next = self.idle_mode();
                self.transition(next);
                Action::Command { text }
            }
        }
    }

    /// Switch mode, clearing both queues so no audio crosses the boundary
    fn transition(&mut self, next: SessionMode) {
        self.transcript.clear();

        if next == self.mode {
            return;
        }

        let kws_dropped = self.kws.as_mut().map_or(0, ChunkBatcher::clear);
        let asr_dropped = self.asr.as_mut().map_or(0, ChunkBatcher::clear);
        debug!(
            "Mode {:?} -> {:?} (cleared {} KWS, {} ASR frames)",
            self.mode, next, kws_dropped, asr_dropped
        );
        self.mode = next;
    }
}
