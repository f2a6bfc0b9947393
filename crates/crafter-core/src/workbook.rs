//! The per-crafter work ledger: a strict FIFO queue of jobs plus the
//! bound forge. Mutation is single-writer (owned by the world); ordering
//! never changes after submission — a later, cheaper job never jumps
//! ahead of an earlier one, and rebinding the forge does not reorder.

use std::fmt;

use contracts::{CreatureId, ForgeId, ItemId, JobStatusEntry};

use crate::job::{ImprovementJob, Job};

#[derive(Debug, Clone, PartialEq)]
pub enum WorkBookError {
    /// Target quality out of range or item already queued.
    InvalidOrder(String),
    /// Mutation attempted on a completed priced job.
    AlreadyDone(ItemId),
    /// The item does not belong to this work book.
    UnknownJob(ItemId),
}

impl fmt::Display for WorkBookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidOrder(reason) => write!(f, "invalid order: {reason}"),
            Self::AlreadyDone(item) => write!(f, "job for item {item} is already done"),
            Self::UnknownJob(item) => write!(f, "no job for item {item}"),
        }
    }
}

impl std::error::Error for WorkBookError {}

#[derive(Debug, Clone, Default)]
pub struct WorkBook {
    jobs: Vec<Job>,
    forge: Option<ForgeId>,
}

impl WorkBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind, or unbind) the shared forge. The owner may do this
    /// at any time; the queue order is unaffected.
    pub fn bind_forge(&mut self, forge: Option<ForgeId>) {
        self.forge = forge;
    }

    pub fn forge(&self) -> Option<ForgeId> {
        self.forge
    }

    /// Append a priced order to the tail. Rejects targets outside
    /// `[0, skill_cap]` and items already present in the queue.
    pub fn submit(
        &mut self,
        item: ItemId,
        customer: CreatureId,
        target_ql: f32,
        mail_when_done: bool,
        price_quote: i64,
        skill_cap: f32,
    ) -> Result<(), WorkBookError> {
        if !target_ql.is_finite() || target_ql < 0.0 || target_ql > skill_cap {
            return Err(WorkBookError::InvalidOrder(format!(
                "target quality {target_ql} outside [0, {skill_cap}]"
            )));
        }
        if self.is_job_item(item) {
            return Err(WorkBookError::InvalidOrder(format!(
                "item {item} is already queued"
            )));
        }
        self.jobs.push(Job::Improvement(ImprovementJob {
            item,
            customer,
            target_ql,
            mail_when_done,
            price_charged: price_quote.max(0),
            done: false,
        }));
        Ok(())
    }

    /// Append a donation marker. Its working target is the skill cap.
    pub fn submit_donation(&mut self, item: ItemId, skill_cap: f32) -> Result<(), WorkBookError> {
        if self.is_job_item(item) {
            return Err(WorkBookError::InvalidOrder(format!(
                "item {item} is already queued"
            )));
        }
        self.jobs.push(Job::donation(item, skill_cap));
        Ok(())
    }

    /// The oldest job that is not done. Does not mutate. Reservation
    /// contention is arbitrated at acquire time, not here; a held forge
    /// defers the job, it does not skip it.
    pub fn next_pending(&self) -> Option<&Job> {
        self.forge?;
        self.jobs.iter().find(|job| !job.is_done())
    }

    /// Mark the job for `item` done with its committed price. Fails with
    /// `AlreadyDone` on a completed priced job; donations are standing
    /// markers and ignore the call.
    pub fn mark_done(&mut self, item: ItemId, price: i64) -> Result<(), WorkBookError> {
        let job = self
            .jobs
            .iter_mut()
            .find(|job| job.item() == item)
            .ok_or(WorkBookError::UnknownJob(item))?;
        match job {
            Job::Improvement(job) => {
                if job.done {
                    return Err(WorkBookError::AlreadyDone(item));
                }
                job.done = true;
                job.price_charged = price.max(0);
                Ok(())
            }
            Job::Donation(_) => Ok(()),
        }
    }

    /// Remove the job for `item` after settlement or on irrecoverable
    /// cancellation.
    pub fn remove(&mut self, item: ItemId) -> Result<Job, WorkBookError> {
        let index = self
            .jobs
            .iter()
            .position(|job| job.item() == item)
            .ok_or(WorkBookError::UnknownJob(item))?;
        Ok(self.jobs.remove(index))
    }

    /// Membership test by item identity.
    pub fn is_job_item(&self, item: ItemId) -> bool {
        self.jobs.iter().any(|job| job.item() == item)
    }

    pub fn job(&self, item: ItemId) -> Option<&Job> {
        self.jobs.iter().find(|job| job.item() == item)
    }

    /// Oldest completed job claimable by `actor`, if any.
    pub fn oldest_done_for(&self, actor: CreatureId) -> Option<&Job> {
        self.jobs
            .iter()
            .find(|job| job.is_done() && job.is_customer(actor))
    }

    /// Whether `actor` has any job queued here, done or not.
    pub fn has_job_for(&self, actor: CreatureId) -> bool {
        self.jobs.iter().any(|job| job.is_customer(actor))
    }

    pub fn jobs(&self) -> &[Job] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Read-only listing for status collaborators.
    pub fn statuses(&self) -> Vec<JobStatusEntry> {
        self.jobs.iter().map(Job::status_entry).collect()
    }

    // -- persisted ledger ---------------------------------------------------

    /// The full ledger in the persisted line format, submission order.
    pub fn encode(&self) -> String {
        self.jobs.iter().map(Job::encode_record).collect()
    }

    /// Rebuild a ledger from persisted text. Malformed lines are skipped
    /// and returned so the caller can log them; partial corruption never
    /// prevents startup.
    pub fn decode(text: &str, skill_cap: f32) -> (WorkBook, Vec<String>) {
        let mut book = WorkBook::new();
        let mut skipped = Vec::new();
        for line in text.lines() {
            if line.trim().is_empty() {
                continue;
            }
            match Job::parse_record(line, skill_cap) {
                Some(job) if !book.is_job_item(job.item()) => book.jobs.push(job),
                _ => skipped.push(line.to_string()),
            }
        }
        (book, skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CAP: f32 = 99.99999;

    fn book_with_forge() -> WorkBook {
        let mut book = WorkBook::new();
        book.bind_forge(Some(77));
        book
    }

    #[test]
    fn submit_preserves_fifo_order() {
        let mut book = book_with_forge();
        book.submit(1, 10, 50.0, false, 100, CAP).expect("first");
        book.submit(2, 11, 30.0, false, 10, CAP).expect("second");
        book.submit(3, 12, 90.0, false, 900, CAP).expect("third");

        let order: Vec<ItemId> = book.jobs().iter().map(Job::item).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(book.next_pending().map(Job::item), Some(1));
    }

    #[test]
    fn submit_rejects_out_of_range_target() {
        let mut book = book_with_forge();
        let err = book.submit(1, 10, 120.0, false, 0, CAP).unwrap_err();
        assert!(matches!(err, WorkBookError::InvalidOrder(_)));
        let err = book.submit(1, 10, -1.0, false, 0, CAP).unwrap_err();
        assert!(matches!(err, WorkBookError::InvalidOrder(_)));
        assert!(book.is_empty());
    }

    #[test]
    fn submit_rejects_duplicate_item() {
        let mut book = book_with_forge();
        book.submit(1, 10, 50.0, false, 100, CAP).expect("first");
        let err = book.submit(1, 11, 60.0, false, 100, CAP).unwrap_err();
        assert!(matches!(err, WorkBookError::InvalidOrder(_)));
        assert_eq!(book.len(), 1);
    }

    #[test]
    fn next_pending_skips_done_jobs_and_needs_a_forge() {
        let mut book = book_with_forge();
        book.submit(1, 10, 50.0, false, 100, CAP).expect("first");
        book.submit(2, 11, 60.0, false, 100, CAP).expect("second");
        book.mark_done(1, 100).expect("done");
        assert_eq!(book.next_pending().map(Job::item), Some(2));

        book.bind_forge(None);
        assert!(book.next_pending().is_none());
    }

    #[test]
    fn mark_done_twice_fails_with_already_done() {
        let mut book = book_with_forge();
        book.submit(1, 10, 50.0, false, 100, CAP).expect("submit");
        book.mark_done(1, 100).expect("first mark");
        let err = book.mark_done(1, 100).unwrap_err();
        assert_eq!(err, WorkBookError::AlreadyDone(1));
    }

    #[test]
    fn mark_done_on_donation_is_ignored() {
        let mut book = book_with_forge();
        book.submit_donation(5, CAP).expect("donation");
        book.mark_done(5, 0).expect("no-op");
        assert!(!book.job(5).expect("job").is_done());
    }

    #[test]
    fn remove_unknown_item_fails() {
        let mut book = book_with_forge();
        assert_eq!(book.remove(9).unwrap_err(), WorkBookError::UnknownJob(9));
    }

    #[test]
    fn decode_skips_malformed_lines_and_keeps_the_rest() {
        let text = "101,202,70,1,250,0\nnot-a-record\n314\n101,202,70,1,250,0\n9,9,9\n";
        let (book, skipped) = WorkBook::decode(text, CAP);
        // The duplicate of item 101 and the two malformed lines are skipped.
        assert_eq!(book.len(), 2);
        assert_eq!(skipped.len(), 3);
        assert!(book.is_job_item(101));
        assert!(book.is_job_item(314));
    }

    #[test]
    fn encode_decode_preserves_ledger() {
        let mut book = book_with_forge();
        book.submit(1, 10, 50.0, true, 120, CAP).expect("submit");
        book.submit_donation(2, CAP).expect("donation");
        book.mark_done(1, 120).expect("done");

        let (reloaded, skipped) = WorkBook::decode(&book.encode(), CAP);
        assert!(skipped.is_empty());
        assert_eq!(reloaded.jobs(), book.jobs());
    }
}
