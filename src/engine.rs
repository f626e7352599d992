//! Conversation engine
//!
//! Drives the tip -> offer -> confirm flow. Stateless across messages: every
//! inbound reply is interpreted from scratch against the store, so there is
//! no session object to lose or corrupt.

use crate::error::Result;
use crate::notify::Notifier;
use crate::parser::{classify, Intent};
use crate::store::{BetInsert, Store, Tip};
use tracing::{info, warn};

/// How an inbound message was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Punter said yes; the current tip was offered to them
    Offered,
    /// Punter said no
    Declined,
    /// A new bet was recorded
    BetRecorded,
    /// A bet for this (punter, tip) pair already existed
    DuplicateResponse,
    /// Sender's number matched no punter
    UnknownSender,
    /// Reply needed a tip but none has been published
    NoActiveTip,
    /// Reply matched no pattern; flagged for manual follow-up
    Unrecognized,
}

/// Reply produced for an inbound message
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub outcome: Outcome,
    pub body: String,
}

impl Response {
    fn new(outcome: Outcome, body: impl Into<String>) -> Self {
        Self {
            outcome,
            body: body.into(),
        }
    }
}

/// Orchestrates punter lookup, reply classification, and bet recording
pub struct Engine<N: Notifier> {
    store: Store,
    notifier: N,
}

impl<N: Notifier> Engine<N> {
    pub fn new(store: Store, notifier: N) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Handle one inbound message and produce the reply to send back.
    ///
    /// Expected conditions (unknown sender, no tip, duplicate, unparseable
    /// text) always produce a reply body; `Err` means the store itself
    /// failed and the request should fail.
    pub fn handle_inbound(&self, from: &str, body: &str) -> Result<Response> {
        let punter = match self.store.punter_by_phone(from)? {
            Some(p) => p,
            None => {
                info!(from = from, "message from unknown number");
                return Ok(Response::new(
                    Outcome::UnknownSender,
                    "Sorry, we don't recognise this number.",
                ));
            }
        };

        match classify(body) {
            Intent::Affirm => match self.store.latest_tip()? {
                Some(tip) => {
                    info!(punter = punter.id, tip = tip.id, "offering tip");
                    Ok(Response::new(Outcome::Offered, offer_text(&tip)))
                }
                None => {
                    info!(punter = punter.id, "affirm but no tip published");
                    Ok(Response::new(Outcome::NoActiveTip, NO_TIP_TEXT))
                }
            },

            Intent::Decline => {
                info!(punter = punter.id, "declined");
                Ok(Response::new(
                    Outcome::Declined,
                    "No worries, we'll be in touch for the next one.",
                ))
            }

            Intent::BetReport { stake, price } => {
                let tip = match self.store.latest_tip()? {
                    Some(t) => t,
                    None => {
                        info!(punter = punter.id, "bet report but no tip published");
                        return Ok(Response::new(Outcome::NoActiveTip, NO_TIP_TEXT));
                    }
                };

                match self.store.record_bet(punter.id, tip.id, &stake, &price)? {
                    BetInsert::Recorded(bet) => {
                        info!(
                            punter = punter.id,
                            tip = tip.id,
                            stake = %bet.stake,
                            price = %bet.price,
                            "bet recorded"
                        );
                        Ok(Response::new(
                            Outcome::BetRecorded,
                            format!(
                                "Thanks, got you down for {} at {}. Good luck!",
                                with_currency(&bet.stake),
                                bet.price
                            ),
                        ))
                    }
                    BetInsert::AlreadyRecorded => {
                        info!(punter = punter.id, tip = tip.id, "duplicate bet report");
                        Ok(Response::new(
                            Outcome::DuplicateResponse,
                            "We've already got a bet down for you on this tip.",
                        ))
                    }
                }
            }

            Intent::Unrecognized(raw) => {
                info!(punter = punter.id, text = %raw, "unrecognized reply");
                Ok(Response::new(
                    Outcome::Unrecognized,
                    "Sorry, we didn't quite get that. Someone will be in touch.",
                ))
            }
        }
    }

    /// Invite every punter to the given tip. Fire-and-forget per recipient:
    /// a failed send is logged and the loop carries on. Returns the number
    /// of invitations that went out.
    pub fn broadcast_tip(&self, tip: &Tip) -> Result<usize> {
        let invitation = invitation_text(tip);
        let mut sent = 0;

        for punter in self.store.punters()? {
            match self.notifier.send(&punter.phone_number, &invitation) {
                Ok(()) => sent += 1,
                Err(e) => {
                    warn!(punter = punter.id, phone = %punter.phone_number, error = %e, "invitation failed");
                }
            }
        }

        info!(tip = tip.id, sent = sent, "broadcast complete");
        Ok(sent)
    }

    /// Send the engine's reply back over SMS
    pub fn send_reply(&self, to: &str, response: &Response) -> Result<()> {
        self.notifier.send(to, &response.body)
    }
}

const NO_TIP_TEXT: &str = "No tip on at the moment. We'll text you when the next one is out.";

fn invitation_text(tip: &Tip) -> String {
    format!(
        "New tip today: {} at {}. Are you about? Reply YES or NO.",
        tip.horse, tip.meeting
    )
}

/// The offer sent on an affirmative reply. The worked example at the end
/// matches the stake/price reply grammar.
fn offer_text(tip: &Tip) -> String {
    let stake = with_currency(&tip.stake);
    format!(
        "Today's tip: {} {} on {}, {} at {}. Minimum price {}. \
         Once you're on, text back your stake and price, e.g. {} {}",
        stake, tip.bet_type, tip.horse, tip.time, tip.meeting, tip.min_price, stake, tip.min_price
    )
}

/// Prefix the currency symbol unless the amount already carries one
fn with_currency(amount: &str) -> String {
    if amount.starts_with('£') {
        amount.to_string()
    } else {
        format!("£{}", amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::RecordingNotifier;
    use crate::store::BetType;
    use tempfile::TempDir;

    fn test_engine(temp_dir: &TempDir) -> Engine<RecordingNotifier> {
        let store = Store::open(&temp_dir.path().join("tipline.db")).unwrap();
        Engine::new(store, RecordingNotifier::new())
    }

    fn add_tip(engine: &Engine<RecordingNotifier>) -> Tip {
        engine
            .store()
            .add_tip("Lucky Boy", "14:30", "Ascot", BetType::Win, "2/1", "10")
            .unwrap()
    }

    #[test]
    fn test_unknown_sender() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);

        let response = engine.handle_inbound("+447700900999", "yes").unwrap();
        assert_eq!(response.outcome, Outcome::UnknownSender);
        assert!(response.body.contains("don't recognise"));
        assert!(engine.store().bets().unwrap().is_empty());
    }

    #[test]
    fn test_affirm_offers_latest_tip() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        add_tip(&engine);

        let response = engine.handle_inbound("+447700900123", "YES").unwrap();
        assert_eq!(response.outcome, Outcome::Offered);
        assert!(response.body.contains("£10 win on Lucky Boy"));
        assert!(response.body.contains("14:30 at Ascot"));
        assert!(response.body.contains("Minimum price 2/1"));
        assert!(response.body.contains("e.g. £10 2/1"));
    }

    #[test]
    fn test_offer_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        add_tip(&engine);

        let first = engine.handle_inbound("+447700900123", "yes").unwrap();
        let second = engine.handle_inbound("+447700900123", "yes").unwrap();
        assert_eq!(first, second);
        assert!(engine.store().bets().unwrap().is_empty());
    }

    #[test]
    fn test_affirm_without_tip() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();

        let response = engine.handle_inbound("+447700900123", "yes").unwrap();
        assert_eq!(response.outcome, Outcome::NoActiveTip);
    }

    #[test]
    fn test_decline_has_no_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        add_tip(&engine);

        let response = engine.handle_inbound("+447700900123", "no").unwrap();
        assert_eq!(response.outcome, Outcome::Declined);
        assert!(engine.store().bets().unwrap().is_empty());
    }

    #[test]
    fn test_bet_report_records_once() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        let punter = engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        let tip = add_tip(&engine);

        let first = engine.handle_inbound("+447700900123", "£50 2/1").unwrap();
        assert_eq!(first.outcome, Outcome::BetRecorded);
        assert!(first.body.contains("£50 at 2/1"));

        let second = engine.handle_inbound("+447700900123", "£50 2/1").unwrap();
        assert_eq!(second.outcome, Outcome::DuplicateResponse);

        let bets = engine.store().bets_for_punter(punter.id).unwrap();
        assert_eq!(bets.len(), 1);
        assert_eq!(bets[0].tip_id, tip.id);
        assert_eq!(bets[0].stake, "50");
        assert_eq!(bets[0].price, "2/1");
    }

    #[test]
    fn test_bet_report_without_tip() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();

        let response = engine.handle_inbound("+447700900123", "£50 2/1").unwrap();
        assert_eq!(response.outcome, Outcome::NoActiveTip);
        assert!(engine.store().bets().unwrap().is_empty());
    }

    #[test]
    fn test_unrecognized_reply() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        add_tip(&engine);

        let response = engine
            .handle_inbound("+447700900123", "maybe later")
            .unwrap();
        assert_eq!(response.outcome, Outcome::Unrecognized);
        assert!(engine.store().bets().unwrap().is_empty());
    }

    #[test]
    fn test_broadcast_reaches_all_punters() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        engine
            .store()
            .add_punter("Arthur", "Daley", "07700900124")
            .unwrap();
        let tip = add_tip(&engine);

        let sent = engine.broadcast_tip(&tip).unwrap();
        assert_eq!(sent, 2);

        let sent = engine.notifier.sent();
        assert!(sent.iter().all(|(_, body)| body.contains("Lucky Boy")));
        assert!(sent.iter().any(|(to, _)| to == "+447700900123"));
        assert!(sent.iter().any(|(to, _)| to == "+447700900124"));
    }

    #[test]
    fn test_broadcast_failure_does_not_block_others() {
        let temp_dir = TempDir::new().unwrap();
        let engine = test_engine(&temp_dir);
        engine
            .store()
            .add_punter("Terry", "McCann", "07700900123")
            .unwrap();
        engine
            .store()
            .add_punter("Arthur", "Daley", "07700900124")
            .unwrap();
        let tip = add_tip(&engine);

        engine.notifier.fail_for("+447700900123");

        let sent = engine.broadcast_tip(&tip).unwrap();
        assert_eq!(sent, 1);
        assert_eq!(engine.notifier.sent()[0].0, "+447700900124");
    }

    #[test]
    fn test_with_currency() {
        assert_eq!(with_currency("10"), "£10");
        assert_eq!(with_currency("£10"), "£10");
    }
}
