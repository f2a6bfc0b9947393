//! Two-party trade sessions: the crafter proposes the committed price as
//! the ask, the counterparty accepts by covering it, rejects by under-
//! offering or declining, or the session aborts on disconnect.

use std::fmt;

use contracts::{CreatureId, ItemId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Opening,
    Negotiating,
    Accepted,
    Rejected,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Opening => "opening",
            Self::Negotiating => "negotiating",
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session is not open for offers in its current state.
    NotNegotiating(SessionState),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNegotiating(state) => {
                write!(f, "session is {state}, not negotiating")
            }
        }
    }
}

impl std::error::Error for SessionError {}

/// Outcome of an offer against the ask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Offer covered the ask; excess is returned as change.
    Accepted { change: i64 },
    /// Offer fell short; the job stays queued.
    Rejected { shortfall: i64 },
}

/// Ephemeral two-party exchange. Created on contract interaction,
/// destroyed once closed; terminal states permit no further mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TradeSession {
    crafter: CreatureId,
    counterparty: CreatureId,
    item: ItemId,
    ask: i64,
    offered: i64,
    state: SessionState,
}

impl TradeSession {
    /// Open a session: the worker proposes `ask` and the session moves
    /// straight from Opening to Negotiating.
    pub fn open(crafter: CreatureId, counterparty: CreatureId, item: ItemId, ask: i64) -> Self {
        Self {
            crafter,
            counterparty,
            item,
            ask: ask.max(0),
            offered: 0,
            state: SessionState::Negotiating,
        }
    }

    pub fn crafter(&self) -> CreatureId {
        self.crafter
    }

    pub fn counterparty(&self) -> CreatureId {
        self.counterparty
    }

    pub fn item(&self) -> ItemId {
        self.item
    }

    pub fn ask(&self) -> i64 {
        self.ask
    }

    pub fn offered(&self) -> i64 {
        self.offered
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    /// Counterparty places currency against the ask.
    pub fn offer(&mut self, coins: i64) -> Result<SessionOutcome, SessionError> {
        if self.state != SessionState::Negotiating {
            return Err(SessionError::NotNegotiating(self.state));
        }
        self.offered = coins.max(0);
        if self.offered >= self.ask {
            self.state = SessionState::Accepted;
            Ok(SessionOutcome::Accepted {
                change: self.offered - self.ask,
            })
        } else {
            self.state = SessionState::Rejected;
            Ok(SessionOutcome::Rejected {
                shortfall: self.ask - self.offered,
            })
        }
    }

    /// Counterparty explicitly declines the ask.
    pub fn decline(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Negotiating {
            return Err(SessionError::NotNegotiating(self.state));
        }
        self.state = SessionState::Rejected;
        Ok(())
    }

    /// Abort: disconnect or the underlying item/resource vanished. The
    /// price proposal is discarded; job state is untouched by design —
    /// the caller releases any reserved resource before yielding control.
    pub fn abort(&mut self) {
        self.state = SessionState::Closed;
        self.offered = 0;
    }

    /// Settlement failed its re-check; the session reverts to Rejected
    /// instead of completing.
    pub(crate) fn revert_to_rejected(&mut self) {
        if self.state == SessionState::Accepted {
            self.state = SessionState::Rejected;
        }
    }

    /// Accepted/Rejected → Closed. Terminal; the session is destroyed by
    /// its owner afterwards.
    pub fn close(&mut self) {
        if matches!(self.state, SessionState::Accepted | SessionState::Rejected) {
            self.state = SessionState::Closed;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> TradeSession {
        TradeSession::open(100, 200, 5, 150)
    }

    #[test]
    fn opens_directly_into_negotiating() {
        let session = session();
        assert_eq!(session.state(), SessionState::Negotiating);
        assert_eq!(session.ask(), 150);
    }

    #[test]
    fn exact_offer_is_accepted_with_zero_change() {
        let mut session = session();
        let outcome = session.offer(150).expect("offer");
        assert_eq!(outcome, SessionOutcome::Accepted { change: 0 });
        assert_eq!(session.state(), SessionState::Accepted);
    }

    #[test]
    fn overpayment_returns_exact_change() {
        let mut session = session();
        let outcome = session.offer(200).expect("offer");
        assert_eq!(outcome, SessionOutcome::Accepted { change: 50 });
    }

    #[test]
    fn short_offer_is_rejected() {
        let mut session = session();
        let outcome = session.offer(149).expect("offer");
        assert_eq!(outcome, SessionOutcome::Rejected { shortfall: 1 });
        assert_eq!(session.state(), SessionState::Rejected);
    }

    #[test]
    fn terminal_states_refuse_further_offers() {
        let mut session = session();
        session.offer(150).expect("offer");
        session.close();
        assert_eq!(session.state(), SessionState::Closed);
        let err = session.offer(500).unwrap_err();
        assert_eq!(err, SessionError::NotNegotiating(SessionState::Closed));
    }

    #[test]
    fn decline_rejects_then_closes() {
        let mut session = session();
        session.decline().expect("decline");
        assert_eq!(session.state(), SessionState::Rejected);
        session.close();
        assert!(session.is_terminal());
    }

    #[test]
    fn abort_discards_the_offer() {
        let mut session = session();
        session.offer(80).ok();
        let mut aborted = TradeSession::open(100, 200, 5, 150);
        aborted.abort();
        assert_eq!(aborted.state(), SessionState::Closed);
        assert_eq!(aborted.offered(), 0);
    }

    #[test]
    fn settlement_failure_reverts_accepted_to_rejected() {
        let mut session = session();
        session.offer(150).expect("offer");
        session.revert_to_rejected();
        assert_eq!(session.state(), SessionState::Rejected);
    }
}
