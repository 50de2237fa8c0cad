use std::collections::HashMap;

use crate::packet::Publish;

/// Allocator for the packet identifiers shared by PUBLISH, SUBSCRIBE and
/// UNSUBSCRIBE. Identifier 0 means "unassigned" on the wire and is never
/// handed out, so the counter wraps from 65535 back to 1.
#[derive(Debug)]
pub(crate) struct PacketIds {
    counter: u16,
}

impl PacketIds {
    pub fn new() -> Self {
        Self { counter: 1 }
    }

    pub fn allocate(&mut self) -> u16 {
        let id = self.counter;
        self.counter = match self.counter {
            u16::MAX => 1,
            n => n + 1,
        };
        id
    }
}

/// In-flight QoS 2 state in both directions.
///
/// Outbound ids move from `awaiting_rec` to `awaiting_comp` as the
/// PUBREC/PUBREL/PUBCOMP exchange progresses. Inbound messages sit in
/// `incoming` until the broker's PUBREL releases them for delivery.
#[derive(Debug, Default)]
pub(crate) struct Qos2State {
    awaiting_rec: Vec<u16>,
    awaiting_comp: Vec<u16>,
    incoming: HashMap<u16, Publish>,
}

impl Qos2State {
    pub fn new() -> Self {
        Self::default()
    }

    /// An outbound QoS 2 publish went out with this id.
    pub fn sent(&mut self, pkid: u16) {
        if !self.awaiting_rec.contains(&pkid) {
            self.awaiting_rec.push(pkid);
        }
    }

    /// PUBREC arrived. Returns whether the id was awaiting one.
    pub fn recorded(&mut self, pkid: u16) -> bool {
        let known = match self.awaiting_rec.iter().position(|id| *id == pkid) {
            Some(pos) => {
                self.awaiting_rec.remove(pos);
                true
            }
            None => false,
        };
        if !self.awaiting_comp.contains(&pkid) {
            self.awaiting_comp.push(pkid);
        }
        known
    }

    /// PUBCOMP arrived. Returns whether the id was awaiting one.
    pub fn completed(&mut self, pkid: u16) -> bool {
        match self.awaiting_comp.iter().position(|id| *id == pkid) {
            Some(pos) => {
                self.awaiting_comp.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Hold an inbound QoS 2 message until its PUBREL.
    pub fn stash(&mut self, publish: Publish) {
        self.incoming.insert(publish.pkid, publish);
    }

    /// PUBREL arrived; hand the held message back for delivery.
    pub fn release(&mut self, pkid: u16) -> Option<Publish> {
        self.incoming.remove(&pkid)
    }

    /// Forget everything in flight. Used when the connection goes away.
    pub fn reset(&mut self) {
        self.awaiting_rec.clear();
        self.awaiting_comp.clear();
        self.incoming.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::QoS;

    #[test]
    fn ids_count_up_from_one() {
        let mut ids = PacketIds::new();
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
        assert_eq!(ids.allocate(), 3);
    }

    #[test]
    fn ids_wrap_to_one_skipping_zero() {
        let mut ids = PacketIds { counter: u16::MAX - 1 };
        assert_eq!(ids.allocate(), u16::MAX - 1);
        assert_eq!(ids.allocate(), u16::MAX);
        assert_eq!(ids.allocate(), 1);
        assert_eq!(ids.allocate(), 2);
    }

    #[test]
    fn outbound_exchange_moves_between_phases() {
        let mut qos2 = Qos2State::new();
        qos2.sent(7);

        assert!(qos2.recorded(7));
        // a duplicate PUBREC is no longer expected
        assert!(!qos2.recorded(7));

        assert!(qos2.completed(7));
        assert!(!qos2.completed(7));
    }

    #[test]
    fn inbound_messages_wait_for_their_release() {
        let mut qos2 = Qos2State::new();
        let mut publish = Publish::new("t", QoS::ExactlyOnce, "payload");
        publish.pkid = 3;
        qos2.stash(publish);

        assert!(qos2.release(9).is_none());
        let released = qos2.release(3).unwrap();
        assert_eq!(released.topic, "t");
        assert!(qos2.release(3).is_none());
    }

    #[test]
    fn reset_forgets_all_in_flight_state() {
        let mut qos2 = Qos2State::new();
        qos2.sent(1);
        let mut publish = Publish::new("t", QoS::ExactlyOnce, "x");
        publish.pkid = 2;
        qos2.stash(publish);

        qos2.reset();
        assert!(!qos2.recorded(1));
        assert!(qos2.release(2).is_none());
    }
}
