//! The broadcast core.
//!
//! [`Relay`] owns the shared state (display settings, banned words, lane
//! cursor) and turns each [`ClientEvent`] into zero or more outbound
//! [`ServerEvent`]s delivered through a [`Multicast`]. It is synchronous and
//! expects a single owner to call it; the server wraps it in an actor task.

use tracing::debug;

use crate::auth::{AdminGate, Session};
use crate::display::{BackgroundDescriptor, DEFAULT_COLOR, DisplaySettings, SettingsStore};
use crate::filter::BannedWords;
use crate::ids::SessionId;
use crate::lanes::LaneAllocator;
use crate::protocol::{ClientEvent, ServerEvent, Snapshot};

/// Notice sent to a sender whose message hit the blocklist.
pub const BANNED_MESSAGE: &str = "Message contains a banned word";
/// Notice sent after a failed admin login.
pub const INVALID_PASSWORD: &str = "Invalid password";

/// Outbound delivery used by the relay.
///
/// Both calls are fire-and-forget and must not block: a slow receiver is
/// the transport's problem, never the relay's.
pub trait Multicast: Send + Sync {
    /// Deliver `event` to one session. Returns `false` if it could not be queued.
    fn send_to(&self, session_id: &SessionId, event: &ServerEvent) -> bool;

    /// Deliver `event` to every session. Returns the number of sessions it
    /// was queued for.
    fn broadcast(&self, event: &ServerEvent) -> usize;
}

/// Why an event produced no output.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Message text was empty after trimming.
    EmptyText,
    /// A privileged event came from a non-admin session.
    Unauthorized,
    /// The request failed validation (e.g. background without URL).
    Invalid,
    /// The request was valid but changed nothing.
    Unchanged,
}

/// What handling one event did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A message was broadcast on `lane`.
    Delivered {
        /// Lane the message was assigned to.
        lane: u32,
    },
    /// A message was rejected by the blocklist.
    Banned,
    /// Admin login succeeded.
    LoginGranted,
    /// Admin login failed.
    LoginDenied,
    /// Shared state changed and a snapshot was broadcast.
    StateChanged,
    /// Nothing was sent.
    Dropped(DropReason),
}

/// Shared state plus the rules that mutate and publish it.
#[derive(Debug)]
pub struct Relay {
    store: SettingsStore,
    banned: BannedWords,
    lanes: LaneAllocator,
    gate: AdminGate,
}

impl Relay {
    /// Create a relay with initial settings, blocklist and admin gate.
    pub fn new(settings: DisplaySettings, banned: BannedWords, gate: AdminGate) -> Self {
        Self {
            store: SettingsStore::new(settings),
            banned,
            lanes: LaneAllocator::new(),
            gate,
        }
    }

    /// Current settings and blocklist.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            settings: self.store.get(),
            banned_words: self.banned.as_slice().to_vec(),
        }
    }

    /// The admin gate.
    pub fn gate(&self) -> &AdminGate {
        &self.gate
    }

    /// Send the full state to a newly connected session.
    pub fn on_connect(&self, session: &Session, out: &dyn Multicast) {
        let _ = out.send_to(session.id(), &ServerEvent::State(self.snapshot()));
    }

    /// Nothing is broadcast when a viewer leaves.
    pub fn on_disconnect(&self, session: &Session) {
        debug!(session_id = %session.id(), "session left relay");
    }

    /// Handle one inbound event from `session`.
    pub fn handle(
        &mut self,
        session: &mut Session,
        event: ClientEvent,
        out: &dyn Multicast,
    ) -> Outcome {
        if event.is_privileged() && !self.gate.authorize(session) {
            debug!(
                session_id = %session.id(),
                event_type = event.event_type(),
                "dropping privileged event from non-admin"
            );
            return Outcome::Dropped(DropReason::Unauthorized);
        }

        match event {
            ClientEvent::SendDanmaku { text, color } => {
                self.send_danmaku(session, &text, color, out)
            }
            ClientEvent::AdminLogin { password } => self.admin_login(session, &password, out),
            ClientEvent::AdminUpdateSettings(patch) => {
                let _ = self.store.apply_partial_update(&patch);
                self.publish_state(out)
            }
            ClientEvent::AdminSetBackground(descriptor) => self.set_background(&descriptor, out),
            ClientEvent::AdminAddBannedWord { word } => {
                let changed = self.banned.add(&word);
                self.publish_if(changed, out)
            }
            ClientEvent::AdminRemoveBannedWord { word } => {
                let changed = self.banned.remove(&word);
                self.publish_if(changed, out)
            }
        }
    }

    fn send_danmaku(
        &mut self,
        session: &Session,
        text: &str,
        color: Option<String>,
        out: &dyn Multicast,
    ) -> Outcome {
        let text = text.trim();
        if text.is_empty() {
            return Outcome::Dropped(DropReason::EmptyText);
        }

        if self.banned.is_banned(text) {
            let alert = ServerEvent::BannedAlert {
                ok: false,
                error: BANNED_MESSAGE.to_owned(),
            };
            let _ = out.send_to(session.id(), &alert);
            return Outcome::Banned;
        }

        let color = color
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_COLOR.to_owned());
        let lane = self.lanes.next_lane(self.store.current().lanes);
        let recipients = out.broadcast(&ServerEvent::Danmaku {
            text: text.to_owned(),
            color,
            lane,
        });
        debug!(session_id = %session.id(), lane, recipients, "danmaku delivered");
        Outcome::Delivered { lane }
    }

    fn admin_login(&self, session: &mut Session, password: &str, out: &dyn Multicast) -> Outcome {
        let outcome = self.gate.login(session, password);
        let reply = ServerEvent::AdminLoginResult {
            ok: outcome.granted,
            error: (!outcome.granted).then(|| INVALID_PASSWORD.to_owned()),
        };
        let _ = out.send_to(session.id(), &reply);
        if outcome.granted {
            Outcome::LoginGranted
        } else {
            Outcome::LoginDenied
        }
    }

    fn set_background(
        &mut self,
        descriptor: &BackgroundDescriptor,
        out: &dyn Multicast,
    ) -> Outcome {
        if self.store.set_background(descriptor) {
            self.publish_state(out)
        } else {
            Outcome::Dropped(DropReason::Invalid)
        }
    }

    fn publish_if(&self, changed: bool, out: &dyn Multicast) -> Outcome {
        if changed {
            self.publish_state(out)
        } else {
            Outcome::Dropped(DropReason::Unchanged)
        }
    }

    fn publish_state(&self, out: &dyn Multicast) -> Outcome {
        let recipients = out.broadcast(&ServerEvent::State(self.snapshot()));
        debug!(recipients, "state broadcast");
        Outcome::StateChanged
    }
}
