//! Job records: one work order per physical item, either a priced
//! improvement/repair or an unpriced donation.

use contracts::{CreatureId, ItemId, JobStatusEntry, NO_CUSTOMER};

use crate::host::WorldHost;

/// A priced order: improve `item` to `target_ql` for `customer`.
///
/// `price_charged` is quoted at submission and committed when the job is
/// marked done; `done` is monotonic and never reverts.
#[derive(Debug, Clone, PartialEq)]
pub struct ImprovementJob {
    pub item: ItemId,
    pub customer: CreatureId,
    pub target_ql: f32,
    pub mail_when_done: bool,
    pub price_charged: i64,
    pub done: bool,
}

/// A donated item the crafter works on indefinitely. Unpriced, never
/// refundable, never mailed, and never reported as done while queued.
#[derive(Debug, Clone, PartialEq)]
pub struct DonationJob {
    pub item: ItemId,
    pub target_ql: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    Improvement(ImprovementJob),
    Donation(DonationJob),
}

impl Job {
    pub fn donation(item: ItemId, skill_cap: f32) -> Self {
        Self::Donation(DonationJob {
            item,
            target_ql: skill_cap,
        })
    }

    pub fn item(&self) -> ItemId {
        match self {
            Self::Improvement(job) => job.item,
            Self::Donation(job) => job.item,
        }
    }

    pub fn target_ql(&self) -> f32 {
        match self {
            Self::Improvement(job) => job.target_ql,
            Self::Donation(job) => job.target_ql,
        }
    }

    pub fn is_donation(&self) -> bool {
        matches!(self, Self::Donation(_))
    }

    /// Whether `actor` is the payment claimant. Donations have none.
    pub fn is_customer(&self, actor: CreatureId) -> bool {
        match self {
            Self::Improvement(job) => job.customer != NO_CUSTOMER && job.customer == actor,
            Self::Donation(_) => false,
        }
    }

    /// Donations report false regardless of elapsed time or queue position;
    /// they are standing ledger markers, not completable orders.
    pub fn is_done(&self) -> bool {
        match self {
            Self::Improvement(job) => job.done,
            Self::Donation(_) => false,
        }
    }

    pub fn price_charged(&self) -> i64 {
        match self {
            Self::Improvement(job) => job.price_charged,
            Self::Donation(_) => 0,
        }
    }

    pub fn mail_when_done(&self) -> bool {
        match self {
            Self::Improvement(job) => job.mail_when_done,
            Self::Donation(_) => false,
        }
    }

    /// Deliver the finished item to the customer. No-op for donations.
    pub fn mail_to_customer(&self, host: &mut dyn WorldHost) {
        if let Self::Improvement(job) = self {
            host.mail_item(job.item, job.customer);
        }
    }

    /// Return the customer's stake (the item, un-improved). No-op for
    /// donations: there is nobody to refund.
    pub fn refund_customer(&self, host: &mut dyn WorldHost) {
        if let Self::Improvement(job) = self {
            host.mail_item(job.item, job.customer);
        }
    }

    pub fn status_entry(&self) -> JobStatusEntry {
        match self {
            Self::Improvement(job) => JobStatusEntry {
                item: job.item,
                donation: false,
                done: job.done,
                price_charged: Some(job.price_charged),
            },
            Self::Donation(job) => JobStatusEntry {
                item: job.item,
                donation: true,
                done: false,
                price_charged: None,
            },
        }
    }

    // -- persisted record shape ---------------------------------------------

    /// One newline-terminated line per job. Improvements serialize every
    /// field in fixed order; donations serialize the item identity alone.
    pub fn encode_record(&self) -> String {
        match self {
            Self::Improvement(job) => format!(
                "{},{},{},{},{},{}\n",
                job.item,
                job.customer,
                job.target_ql,
                u8::from(job.mail_when_done),
                job.price_charged,
                u8::from(job.done),
            ),
            Self::Donation(job) => format!("{}\n", job.item),
        }
    }

    /// Parse one persisted line. Returns `None` for anything malformed;
    /// the caller skips the line and keeps loading.
    pub fn parse_record(line: &str, skill_cap: f32) -> Option<Job> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        let fields: Vec<&str> = line.split(',').collect();
        match fields.len() {
            1 => {
                let item = fields[0].parse::<ItemId>().ok()?;
                Some(Job::donation(item, skill_cap))
            }
            6 => {
                let item = fields[0].parse::<ItemId>().ok()?;
                let customer = fields[1].parse::<CreatureId>().ok()?;
                let target_ql = fields[2].parse::<f32>().ok()?;
                let mail_when_done = parse_flag(fields[3])?;
                let price_charged = fields[4].parse::<i64>().ok()?;
                let done = parse_flag(fields[5])?;
                if !target_ql.is_finite()
                    || target_ql < 0.0
                    || target_ql > skill_cap
                    || price_charged < 0
                {
                    return None;
                }
                Some(Job::Improvement(ImprovementJob {
                    item,
                    customer,
                    target_ql,
                    mail_when_done,
                    price_charged,
                    done,
                }))
            }
            _ => None,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw {
        "0" => Some(false),
        "1" => Some(true),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::MemoryHost;

    fn improvement(item: ItemId, customer: CreatureId) -> Job {
        Job::Improvement(ImprovementJob {
            item,
            customer,
            target_ql: 70.0,
            mail_when_done: true,
            price_charged: 250,
            done: false,
        })
    }

    #[test]
    fn donation_reports_pending_forever() {
        let job = Job::donation(9, 99.99999);
        assert!(job.is_donation());
        assert!(!job.is_done());
        assert!(!job.is_customer(42));
        assert_eq!(job.price_charged(), 0);
    }

    #[test]
    fn donation_mail_and_refund_are_no_ops() {
        let mut host = MemoryHost::new();
        host.add_item(9, 30.0);
        let job = Job::donation(9, 99.99999);
        job.mail_to_customer(&mut host);
        job.refund_customer(&mut host);
        assert!(host.mailbox().is_empty());
    }

    #[test]
    fn improvement_round_trips_through_record() {
        let job = improvement(101, 202);
        let line = job.encode_record();
        assert_eq!(line, "101,202,70,1,250,0\n");
        let parsed = Job::parse_record(&line, 99.99999).expect("parse");
        assert_eq!(parsed, job);
    }

    #[test]
    fn donation_record_is_item_identity_only() {
        let job = Job::donation(314, 99.99999);
        assert_eq!(job.encode_record(), "314\n");
        let parsed = Job::parse_record("314", 99.99999).expect("parse");
        assert!(parsed.is_donation());
        assert_eq!(parsed.item(), 314);
    }

    #[test]
    fn malformed_records_are_rejected() {
        let cap = 99.99999;
        assert!(Job::parse_record("", cap).is_none());
        assert!(Job::parse_record("a,b,c", cap).is_none());
        assert!(Job::parse_record("101,202,70,1,250", cap).is_none());
        assert!(Job::parse_record("101,202,70,2,250,0", cap).is_none());
        assert!(Job::parse_record("101,202,120,0,250,0", cap).is_none());
        assert!(Job::parse_record("101,202,70,0,-5,0", cap).is_none());
        assert!(Job::parse_record("forge", cap).is_none());
    }

    #[test]
    fn customer_zero_never_matches_any_actor() {
        let job = Job::Improvement(ImprovementJob {
            item: 1,
            customer: NO_CUSTOMER,
            target_ql: 50.0,
            mail_when_done: false,
            price_charged: 0,
            done: false,
        });
        assert!(!job.is_customer(0));
        assert!(!job.is_customer(7));
    }
}
