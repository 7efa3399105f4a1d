use askpanel_core::{Dispatcher, Outcome, Placeholder, Session, SpeechEvent, TurnFollowUp, VoiceBridge};
use ratatui::{layout::Rect, text::Span};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::tui::AppEvent;

pub struct App {
    // Core state
    pub should_quit: bool,
    pub session: Session,

    // Collaborators
    pub dispatcher: Dispatcher,
    pub voice: Option<VoiceBridge>,
    pub events: UnboundedSender<AppEvent>,

    // Prompt editing
    pub prompt_cursor: usize, // cursor position in session.prompt, in chars

    // Turn state
    pub turn_in_flight: bool,
    pub turn_generation: u64, // bumped on every submit; stale voice follow-ups are dropped
    pub listening: bool,

    // Transcript view
    pub transcript_scroll: u16,
    pub transcript_height: u16, // Height of transcript area for scroll calculations
    pub transcript_width: u16,  // Width of transcript area for wrap calculations
    pub transcript_area: Option<Rect>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
}

impl App {
    pub fn new(
        session: Session,
        dispatcher: Dispatcher,
        voice: Option<VoiceBridge>,
        events: UnboundedSender<AppEvent>,
    ) -> Self {
        Self {
            should_quit: false,
            session,
            dispatcher,
            voice,
            events,
            prompt_cursor: 0,
            turn_in_flight: false,
            turn_generation: 0,
            listening: false,
            transcript_scroll: 0,
            transcript_height: 0,
            transcript_width: 0,
            transcript_area: None,
            animation_frame: 0,
        }
    }

    /// Sends the prompt. Ignored while a turn is still waiting for its answer.
    pub fn submit(&mut self) {
        if self.turn_in_flight {
            return;
        }
        let Some(request) = self.session.begin_turn() else {
            return;
        };

        self.prompt_cursor = 0;
        self.turn_in_flight = true;
        self.turn_generation += 1;
        self.scroll_transcript_to_bottom();

        let dispatcher = self.dispatcher.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let outcome = dispatcher.dispatch(&request).await;
            let _ = events.send(AppEvent::TurnFinished(outcome));
        });
    }

    pub fn finish_turn(&mut self, outcome: Outcome) {
        self.turn_in_flight = false;
        let follow_up = self.session.apply_outcome(&outcome);
        self.scroll_transcript_to_bottom();
        self.run_follow_up(follow_up);
    }

    fn run_follow_up(&mut self, follow_up: TurnFollowUp) {
        let Some(voice) = self.voice.clone() else {
            return;
        };
        let TurnFollowUp { speak, listen_again } = follow_up;
        if speak.is_none() && !listen_again {
            return;
        }
        if speak.is_none() {
            self.session.begin_waiting_for_speech();
        }

        let turn = self.turn_generation;
        let language = self.session.settings.speech_language.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Some(text) = speak {
                if let Err(e) = voice.speak(&text, &language).await {
                    warn!(error = %e, "read-aloud failed");
                }
                let _ = events.send(AppEvent::ReadAloudStarted { turn, listen_again });
            }
            if listen_again {
                voice.wait_until_quiet().await;
                let _ = events.send(AppEvent::ListenAgain { turn });
            }
        });
    }

    /// A follow-up belongs to the latest turn and that turn has been answered.
    fn follow_up_is_current(&self, turn: u64) -> bool {
        turn == self.turn_generation && !self.turn_in_flight
    }

    pub fn read_aloud_started(&mut self, turn: u64, listen_again: bool) {
        if !self.follow_up_is_current(turn) {
            return;
        }
        self.session.finish_speaking();
        if listen_again {
            self.session.begin_waiting_for_speech();
        }
    }

    /// Continuous conversation ends as soon as the user turns it off or
    /// sends another prompt.
    pub fn listen_again(&mut self, turn: u64) {
        if !self.follow_up_is_current(turn) {
            debug!(turn, current = self.turn_generation, "dropping stale listen request");
            return;
        }
        if self.session.settings.continuous_conversation {
            self.start_listening();
        } else {
            self.session.placeholder = Placeholder::Idle;
        }
    }

    pub fn start_listening(&mut self) {
        let Some(voice) = self.voice.clone().filter(VoiceBridge::can_listen) else {
            self.session.placeholder = Placeholder::Idle;
            return;
        };
        self.session.begin_listening();
        self.listening = true;
        self.scroll_transcript_to_bottom();

        let language = self.session.settings.speech_language.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = voice.start_listening(&language).await {
                let _ = events.send(AppEvent::Speech(SpeechEvent::Error(e.to_string())));
            }
        });
    }

    pub fn stop_voice(&mut self) {
        let Some(voice) = self.voice.clone() else {
            return;
        };
        self.listening = false;
        tokio::spawn(async move {
            if let Err(e) = voice.stop().await {
                warn!(error = %e, "could not stop speech");
            }
        });
    }

    /// Microphone button.
    pub fn toggle_microphone(&mut self) {
        if self.listening || self.session.voice_busy {
            self.stop_voice();
        } else {
            self.start_listening();
        }
    }

    pub fn handle_speech_event(&mut self, event: SpeechEvent) {
        match event {
            SpeechEvent::Result(text) => {
                info!(chars = text.chars().count(), "speech recognized");
                self.listening = false;
                let auto_send = self.session.on_recognized(&text);
                self.prompt_cursor = self.session.prompt.chars().count();
                if auto_send {
                    if let Some(voice) = self.voice.clone() {
                        let events = self.events.clone();
                        tokio::spawn(async move {
                            if voice.ready_for_auto_send().await {
                                let _ = events.send(AppEvent::AutoSubmit);
                            }
                        });
                    }
                }
            }
            SpeechEvent::Error(message) => {
                warn!(%message, "speech recognition error");
                self.listening = false;
                self.session.on_recognition_error(&message);
                self.scroll_transcript_to_bottom();
            }
            SpeechEvent::BusyChanged(busy) => {
                self.session.voice_busy = busy;
            }
        }
    }

    pub fn clear(&mut self) {
        self.session.clear();
        self.prompt_cursor = 0;
        self.transcript_scroll = 0;
    }

    pub fn escape(&mut self) {
        self.session.escape();
        self.prompt_cursor = 0;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.turn_in_flight {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    pub fn scroll_up(&mut self, lines: u16) {
        self.transcript_scroll = self.transcript_scroll.saturating_sub(lines);
    }

    pub fn scroll_down(&mut self, lines: u16) {
        let max_scroll = self.transcript_line_count().saturating_sub(self.visible_height());
        self.transcript_scroll = self.transcript_scroll.saturating_add(lines).min(max_scroll);
    }

    /// Keeps the newest transcript line in view.
    pub fn scroll_transcript_to_bottom(&mut self) {
        let total_lines = self.transcript_line_count();
        let visible_height = self.visible_height();
        self.transcript_scroll = total_lines.saturating_sub(visible_height);
    }

    fn visible_height(&self) -> u16 {
        if self.transcript_height > 0 {
            self.transcript_height
        } else {
            20
        }
    }

    /// Rendered line count of the transcript after wrapping.
    pub fn transcript_line_count(&self) -> u16 {
        // Use actual transcript width for wrap calculation, default to 50 if not set
        let wrap_width = if self.transcript_width > 0 {
            self.transcript_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for line in self.session.transcript().text().lines() {
            // Display width, so double-width CJK text wraps the way ratatui draws it
            let width = Span::raw(line).width();
            let rows = if width == 0 {
                1 // Empty line still takes one line
            } else {
                u16::try_from(width.div_ceil(wrap_width)).unwrap_or(u16::MAX)
            };
            total_lines = total_lines.saturating_add(rows);
        }

        // Room for the "Thinking..." indicator
        if self.turn_in_flight {
            total_lines = total_lines.saturating_add(1);
        }
        total_lines
    }
}
