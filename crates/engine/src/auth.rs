//! Authentication state machine and the driver that feeds it.
//!
//! [`transition`] is pure: given the current [`AuthState`] and what the page
//! showed, it returns the next state plus the effects to perform. The
//! [`Authenticator`] performs observations against a [`PageDriver`] and
//! carries out those effects (rendering challenges, sleeping).

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use wadriver_browser::PageDriver;
use wadriver_core::config::AuthConfig;
use wadriver_core::{Error, Paths, Result};

use crate::challenge::AuthChallenge;
use crate::selectors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthState {
    Uninitialized,
    Probing { round: u32 },
    AwaitingChallenge { challenge: AuthChallenge, polls: u32 },
    Authenticated,
    Failed(AuthFailure),
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Authenticated | Self::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    /// No login and no pairing code in any round.
    NoChallenge,
    /// Pairing codes were shown but never scanned.
    ChallengeExpired,
}

/// What one look at the page found, highest priority first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    LoggedIn,
    /// The encrypted-chats banner shown between scan and chat list.
    Syncing,
    Challenge(String),
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Present(AuthChallenge),
    Sleep(Duration),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub next: AuthState,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn to(next: AuthState) -> Self {
        Self {
            next,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Timing and retry budget for the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthPolicy {
    pub max_rounds: u32,
    pub poll_interval: Duration,
    pub polls_per_window: u32,
    pub round_backoff: Duration,
    pub sync_settle: Duration,
}

impl AuthPolicy {
    pub fn from_config(config: &AuthConfig) -> Self {
        let poll = config.poll_interval();
        let window = config.observation_window();
        let polls = (window.as_millis() / poll.as_millis().max(1)).max(1);
        Self {
            max_rounds: config.max_rounds.max(1),
            poll_interval: poll,
            polls_per_window: u32::try_from(polls).unwrap_or(u32::MAX),
            round_backoff: config.round_backoff(),
            sync_settle: config.sync_settle(),
        }
    }
}

pub fn transition(
    state: &AuthState,
    observation: Observation,
    policy: &AuthPolicy,
    now: DateTime<Utc>,
) -> Transition {
    match state {
        AuthState::Authenticated | AuthState::Failed(_) => Transition::to(state.clone()),

        AuthState::Uninitialized => {
            transition(&AuthState::Probing { round: 1 }, observation, policy, now)
        }

        AuthState::Probing { round } => match observation {
            Observation::LoggedIn => Transition::to(AuthState::Authenticated),
            Observation::Syncing => {
                Transition::to(AuthState::Authenticated).with(Effect::Sleep(policy.sync_settle))
            }
            Observation::Challenge(payload) => {
                let challenge = AuthChallenge::new(payload, *round, now);
                Transition::to(AuthState::AwaitingChallenge {
                    challenge: challenge.clone(),
                    polls: 0,
                })
                .with(Effect::Present(challenge))
                .with(Effect::Sleep(policy.poll_interval))
            }
            Observation::Nothing if *round >= policy.max_rounds => {
                Transition::to(AuthState::Failed(AuthFailure::NoChallenge))
            }
            Observation::Nothing => Transition::to(AuthState::Probing { round: round + 1 })
                .with(Effect::Sleep(policy.round_backoff)),
        },

        AuthState::AwaitingChallenge { challenge, polls } => match observation {
            Observation::LoggedIn => Transition::to(AuthState::Authenticated),
            Observation::Syncing => {
                Transition::to(AuthState::Authenticated).with(Effect::Sleep(policy.sync_settle))
            }
            Observation::Challenge(_) | Observation::Nothing => {
                let polls = polls + 1;
                if polls < policy.polls_per_window {
                    Transition::to(AuthState::AwaitingChallenge {
                        challenge: challenge.clone(),
                        polls,
                    })
                    .with(Effect::Sleep(policy.poll_interval))
                } else if challenge.attempt_index >= policy.max_rounds {
                    Transition::to(AuthState::Failed(AuthFailure::ChallengeExpired))
                } else {
                    // Window over: look for a fresh code right away.
                    Transition::to(AuthState::Probing {
                        round: challenge.attempt_index + 1,
                    })
                }
            }
        },
    }
}

/// Outcome of a successful login.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuthOutcome {
    pub challenges_presented: u32,
}

pub struct Authenticator<'a> {
    page: &'a dyn PageDriver,
    config: &'a AuthConfig,
    paths: &'a Paths,
}

impl<'a> Authenticator<'a> {
    pub fn new(page: &'a dyn PageDriver, config: &'a AuthConfig, paths: &'a Paths) -> Self {
        Self {
            page,
            config,
            paths,
        }
    }

    /// Drive the page to a logged-in state or fail with `Error::Authentication`.
    pub async fn ensure_authenticated(&self) -> Result<AuthOutcome> {
        self.wait_for_first_render().await;
        self.wait_for_loading_splash().await;

        let policy = AuthPolicy::from_config(self.config);
        let mut state = AuthState::Uninitialized;
        let mut outcome = AuthOutcome::default();

        while !state.is_terminal() {
            let observation = match &state {
                AuthState::AwaitingChallenge { .. } => self.observe_login().await,
                _ => self.probe().await,
            };
            debug!(state = ?state, observation = ?observation, "Auth step");

            let step = transition(&state, observation, &policy, Utc::now());
            if let AuthState::Probing { round } = &step.next {
                info!(round = *round, max_rounds = policy.max_rounds, "Probing login state");
            }
            for effect in step.effects {
                match effect {
                    Effect::Present(challenge) => {
                        outcome.challenges_presented += 1;
                        self.present(&challenge);
                    }
                    Effect::Sleep(d) => tokio::time::sleep(d).await,
                }
            }
            state = step.next;
        }

        match state {
            AuthState::Authenticated => {
                info!(challenges = outcome.challenges_presented, "Logged in");
                Ok(outcome)
            }
            AuthState::Failed(AuthFailure::ChallengeExpired) => Err(Error::Authentication(format!(
                "Pairing code was not scanned after {} attempts",
                policy.max_rounds
            ))),
            _ => Err(Error::Authentication(format!(
                "Neither the chat list nor a pairing code appeared after {} attempts",
                policy.max_rounds
            ))),
        }
    }

    async fn wait_for_first_render(&self) {
        let deadline = Instant::now() + self.config.initial_wait();
        loop {
            if self.present_any(&[selectors::FIRST_RENDER]).await {
                return;
            }
            if Instant::now() >= deadline {
                warn!(
                    timeout_secs = self.config.initial_wait_secs,
                    "Timed out waiting for chat list or pairing code"
                );
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn wait_for_loading_splash(&self) {
        if !self.text_present(selectors::LOADING_SPLASH_TEXT).await {
            return;
        }
        info!("Waiting for chats to finish loading");
        let deadline = Instant::now() + self.config.initial_wait();
        while self.text_present(selectors::LOADING_SPLASH_TEXT).await {
            if Instant::now() >= deadline {
                warn!("Chat loading splash did not go away");
                return;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn observe_login(&self) -> Observation {
        if self.present_any(selectors::LOGIN_INDICATORS).await {
            return Observation::LoggedIn;
        }
        if self.text_present(selectors::ENCRYPTED_BANNER_TEXT).await {
            return Observation::Syncing;
        }
        Observation::Nothing
    }

    /// Full probe: login indicators, then the sync banner, then a pairing code.
    async fn probe(&self) -> Observation {
        match self.observe_login().await {
            Observation::Nothing => {}
            found => return found,
        }

        let mut captured = false;
        for selector in selectors::QR_SELECTORS {
            if !self.present_any(&[*selector]).await {
                continue;
            }
            match self.page.attribute(selector, selectors::QR_PAYLOAD_ATTR).await {
                Ok(Some(payload)) if !payload.trim().is_empty() => {
                    debug!(selector = *selector, "Pairing code found");
                    return Observation::Challenge(payload);
                }
                Ok(_) if !captured => {
                    captured = true;
                    self.capture_unreadable_code(selector).await;
                }
                Ok(_) => {}
                Err(e) => debug!(selector = *selector, error = %e, "Reading pairing code failed"),
            }
        }
        Observation::Nothing
    }

    /// The code is drawn on a canvas without a payload: save a picture of it
    /// so someone can scan it by hand.
    async fn capture_unreadable_code(&self, selector: &str) {
        let path = self.paths.pairing_canvas_png();
        let result = match self.page.screenshot(Some(selector)).await {
            Ok(png) => write_artifact(&path, &png),
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => warn!(
                path = %path.display(),
                "Pairing code found but unreadable; saved a screenshot to scan manually"
            ),
            Err(e) => warn!(error = %e, "Pairing code screenshot failed"),
        }
    }

    fn present(&self, challenge: &AuthChallenge) {
        let path = self.paths.pairing_qr_svg();
        match challenge.write_svg(&path) {
            Ok(()) => info!(
                path = %path.display(),
                attempt = challenge.attempt_index,
                "Pairing code ready; scan it with WhatsApp > Linked devices"
            ),
            Err(e) => warn!(error = %e, "Failed to save pairing code"),
        }
        if self.config.print_qr_to_terminal {
            match challenge.to_terminal() {
                Ok(text) => {
                    eprintln!();
                    eprintln!(
                        "  Scan this code with WhatsApp (attempt {}/{}):",
                        challenge.attempt_index, self.config.max_rounds
                    );
                    eprintln!("{}", text);
                }
                Err(e) => warn!(error = %e, "Failed to render pairing code"),
            }
        }
    }

    async fn present_any(&self, selectors: &[&str]) -> bool {
        for selector in selectors {
            match self.page.count(selector).await {
                Ok(n) if n > 0 => return true,
                Ok(_) => {}
                Err(e) => debug!(selector = *selector, error = %e, "Selector check failed"),
            }
        }
        false
    }

    async fn text_present(&self, text: &str) -> bool {
        self.page.has_text(text, false).await.unwrap_or_else(|e| {
            debug!(text, error = %e, "Text check failed");
            false
        })
    }
}

pub(crate) fn write_artifact(path: &std::path::Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, bytes)?;
    Ok(())
}
