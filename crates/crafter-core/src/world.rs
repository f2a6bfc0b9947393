//! `CrafterWorld`: the engine that owns the crafters, their work queues,
//! the forge registry, open trade sessions, and the settlement ledger.
//!
//! The tick loop drains each queue per the order flow: next pending job →
//! try-acquire the bound forge → advance work progress → on reaching the
//! target, commit the price and open collection (or deliver directly).
//! Contention and per-tick failures defer, they never abort the loop.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use contracts::{
    CrafterConfig, CreatureId, ForgeId, ItemId, JobStatusEntry, SkillType, WorkEvent,
    WorkEventKind,
};

use crate::forge::{AccessRuling, ForgeRegistry};
use crate::host::WorldHost;
use crate::negotiation::{SessionError, SessionOutcome, TradeSession};
use crate::pricing;
use crate::settlement::{SettlementError, SettlementLedger};
use crate::workbook::{WorkBook, WorkBookError};

/// Quality gained per tick of uninterrupted forge work.
pub const QL_GAIN_PER_TICK: f32 = 5.0;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TradeError {
    UnknownCrafter(CreatureId),
    /// The actor has no completed job awaiting collection here.
    NoCompletedWork,
    /// No open session between this crafter and actor.
    NoSession,
    /// The session's item vanished mid-session; the session was aborted.
    ItemUnavailable(ItemId),
    Session(SessionError),
    Book(WorkBookError),
    Settlement(SettlementError),
}

impl fmt::Display for TradeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownCrafter(id) => write!(f, "no crafter with id {id}"),
            Self::NoCompletedWork => write!(f, "no completed work awaiting collection"),
            Self::NoSession => write!(f, "no open trade session"),
            Self::ItemUnavailable(item) => write!(f, "item {item} is no longer available"),
            Self::Session(err) => write!(f, "session error: {err}"),
            Self::Book(err) => write!(f, "work book error: {err}"),
            Self::Settlement(err) => write!(f, "settlement error: {err}"),
        }
    }
}

impl std::error::Error for TradeError {}

impl From<SessionError> for TradeError {
    fn from(value: SessionError) -> Self {
        Self::Session(value)
    }
}

impl From<WorkBookError> for TradeError {
    fn from(value: WorkBookError) -> Self {
        Self::Book(value)
    }
}

impl From<SettlementError> for TradeError {
    fn from(value: SettlementError) -> Self {
        Self::Settlement(value)
    }
}

// ---------------------------------------------------------------------------
// Crafter
// ---------------------------------------------------------------------------

/// One service worker: identity, craft skill, and its work ledger. State
/// lives on the worker's own record, never in shared registries keyed by
/// live objects.
#[derive(Debug, Clone)]
pub struct Crafter {
    pub id: CreatureId,
    pub name: String,
    pub skill: SkillType,
    /// Carried for host-side display (status listings, CLI). Pricing
    /// keys on the skill type's multiplier only; skill progression is
    /// outside this kernel.
    pub skill_level: f32,
    pub workbook: WorkBook,
}

/// Everything needed to persist one crafter: identity columns plus the
/// work ledger in its line-record shape.
#[derive(Debug, Clone, PartialEq)]
pub struct CrafterSnapshot {
    pub id: CreatureId,
    pub name: String,
    pub skill: SkillType,
    pub skill_level: f32,
    pub owner: CreatureId,
    pub balance: i64,
    pub forge: Option<ForgeId>,
    pub workbook_text: String,
}

// ---------------------------------------------------------------------------
// CrafterWorld
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CrafterWorld {
    config: CrafterConfig,
    forges: Arc<ForgeRegistry>,
    ledger: SettlementLedger,
    crafters: BTreeMap<CreatureId, Crafter>,
    /// Open sessions keyed by (crafter, counterparty). Single-worker,
    /// single-counterparty; terminal sessions are removed immediately.
    sessions: BTreeMap<(CreatureId, CreatureId), TradeSession>,
    events: Vec<WorkEvent>,
    tick: u64,
}

impl CrafterWorld {
    pub fn new(config: CrafterConfig) -> Self {
        Self::with_registry(config, Arc::new(ForgeRegistry::new()))
    }

    /// Build against a shared registry, for hosts where other actors also
    /// contend for the same forges.
    pub fn with_registry(mut config: CrafterConfig, forges: Arc<ForgeRegistry>) -> Self {
        let warnings = config.normalize();
        let mut world = Self {
            config,
            forges,
            ledger: SettlementLedger::new(),
            crafters: BTreeMap::new(),
            sessions: BTreeMap::new(),
            events: Vec::new(),
            tick: 0,
        };
        for warning in warnings {
            world
                .events
                .push(WorkEvent::with_detail(0, 0, WorkEventKind::ConfigAdjusted, warning));
        }
        world
    }

    pub fn config(&self) -> &CrafterConfig {
        &self.config
    }

    pub fn forge_registry(&self) -> Arc<ForgeRegistry> {
        Arc::clone(&self.forges)
    }

    pub fn current_tick(&self) -> u64 {
        self.tick
    }

    pub fn events(&self) -> &[WorkEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<WorkEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn crafter(&self, id: CreatureId) -> Option<&Crafter> {
        self.crafters.get(&id)
    }

    pub fn owner_of(&self, crafter: CreatureId) -> Option<CreatureId> {
        self.ledger.owner_of(crafter)
    }

    pub fn shop_balance(&self, crafter: CreatureId) -> Option<i64> {
        self.ledger.balance_of(crafter)
    }

    pub fn tax_balance(&self) -> i64 {
        self.ledger.tax_balance()
    }

    pub fn upkeep_consumed(&self) -> i64 {
        self.ledger.upkeep_consumed()
    }

    // -- lifecycle ----------------------------------------------------------

    pub fn add_crafter(&mut self, id: CreatureId, name: impl Into<String>, skill: SkillType, owner: CreatureId) {
        self.crafters.entry(id).or_insert_with(|| Crafter {
            id,
            name: name.into(),
            skill,
            skill_level: self.config.starting_skill,
            workbook: WorkBook::new(),
        });
        self.ledger.register_shop(id, owner);
    }

    /// Destroy a worker: reservations dropped, shop removed, open
    /// sessions aborted.
    pub fn remove_crafter(&mut self, id: CreatureId) {
        self.forges.release_all(id);
        self.ledger.remove_shop(id);
        self.sessions.retain(|(crafter, _), _| *crafter != id);
        self.crafters.remove(&id);
    }

    /// Bind, rebind, or unbind the crafter's forge. Releases any hold on
    /// the previous forge; the queue order is untouched.
    pub fn bind_forge(&mut self, id: CreatureId, forge: Option<ForgeId>) -> Result<(), TradeError> {
        let crafter = self
            .crafters
            .get_mut(&id)
            .ok_or(TradeError::UnknownCrafter(id))?;
        let previous = crafter.workbook.forge();
        crafter.workbook.bind_forge(forge);
        if let Some(previous) = previous {
            if forge != Some(previous) {
                self.forges.release(previous, id);
            }
        }
        Ok(())
    }

    /// Ruling for an external actor trying to open a forge.
    pub fn forge_access(&self, forge: ForgeId, actor_power: u8) -> AccessRuling {
        self.forges
            .ruling(forge, actor_power, self.config.forge_override_power)
    }

    // -- order submission ---------------------------------------------------

    /// Submit a priced order. The quote is computed from the item's
    /// current quality and stored on the job; it is committed unchanged
    /// when the work completes. Returns the quote in irons.
    pub fn submit_order(
        &mut self,
        crafter_id: CreatureId,
        item: ItemId,
        customer: CreatureId,
        target_ql: f32,
        mail_when_done: bool,
        host: &dyn WorldHost,
    ) -> Result<i64, TradeError> {
        let skill_cap = self.config.skill_cap;
        let crafter = self
            .crafters
            .get_mut(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        let current_ql = host.item_quality(item).ok_or_else(|| {
            TradeError::Book(WorkBookError::InvalidOrder(format!(
                "item {item} does not exist"
            )))
        })?;
        let quote = pricing::quote(crafter.skill, current_ql, target_ql, mail_when_done, &self.config);
        crafter
            .workbook
            .submit(item, customer, target_ql, mail_when_done, quote, skill_cap)?;
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::OrderSubmitted,
            format!("item={item} customer={customer} target={target_ql} quote={quote}"),
        ));
        Ok(quote)
    }

    /// Record a donated item: unpriced, never mailed, worked to the cap.
    pub fn submit_donation(
        &mut self,
        crafter_id: CreatureId,
        item: ItemId,
    ) -> Result<(), TradeError> {
        let skill_cap = self.config.skill_cap;
        let crafter = self
            .crafters
            .get_mut(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        crafter.workbook.submit_donation(item, skill_cap)?;
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::DonationRecorded,
            format!("item={item}"),
        ));
        Ok(())
    }

    /// Customer cancels an undone order. The stake (the item) is returned
    /// un-improved, any open session between the pair aborts, and the
    /// forge hold is released. Completed jobs must be collected instead;
    /// donations have no claimant and cannot be cancelled.
    pub fn cancel_order(
        &mut self,
        crafter_id: CreatureId,
        actor: CreatureId,
        item: ItemId,
        host: &mut dyn WorldHost,
    ) -> Result<(), TradeError> {
        let forge = {
            let crafter = self
                .crafters
                .get(&crafter_id)
                .ok_or(TradeError::UnknownCrafter(crafter_id))?;
            let job = crafter
                .workbook
                .job(item)
                .ok_or(TradeError::Book(WorkBookError::UnknownJob(item)))?;
            if !job.is_customer(actor) {
                return Err(TradeError::Book(WorkBookError::UnknownJob(item)));
            }
            if job.is_done() {
                return Err(TradeError::Book(WorkBookError::AlreadyDone(item)));
            }
            crafter.workbook.forge()
        };

        if let Some(mut session) = self.sessions.remove(&(crafter_id, actor)) {
            session.abort();
            self.events.push(WorkEvent::with_detail(
                self.tick,
                crafter_id,
                WorkEventKind::TradeAborted,
                format!("cancelled by customer {actor}"),
            ));
        }

        let crafter = self
            .crafters
            .get_mut(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        let job = crafter.workbook.remove(item)?;
        if let Some(forge) = forge {
            self.forges.release(forge, crafter_id);
        }
        job.refund_customer(host);
        host.post_message(crafter_id, &format!("Your order for item {item} was cancelled."));
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::OrderCancelled,
            format!("item={item} customer={actor}"),
        ));
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::StakeReturned,
            format!("item={item} mailed back to {actor}"),
        ));
        Ok(())
    }

    // -- status -------------------------------------------------------------

    /// Read-only queue listing for a crafter.
    pub fn job_statuses(&self, crafter_id: CreatureId) -> Result<Vec<JobStatusEntry>, TradeError> {
        let crafter = self
            .crafters
            .get(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        Ok(crafter.workbook.statuses())
    }

    /// Plain-text per-crafter report for the status collaborator.
    pub fn status_report(&self, crafter_id: CreatureId) -> Result<String, TradeError> {
        let crafter = self
            .crafters
            .get(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        let jobs = crafter.workbook.jobs();
        let donations = jobs.iter().filter(|job| job.is_donation()).count();
        let awaiting = jobs.iter().filter(|job| job.is_done()).count();
        let queued = jobs.len() - donations - awaiting;
        Ok(format!(
            "{} ({}): {} orders queued, {} awaiting collection, {} donations",
            crafter.name, crafter.id, queued, awaiting, donations
        ))
    }

    // -- negotiation lifecycle ---------------------------------------------

    /// Contract interaction: open a session for the actor's oldest
    /// completed job. The crafter proposes the committed price as the ask.
    pub fn begin_collection(
        &mut self,
        crafter_id: CreatureId,
        actor: CreatureId,
        host: &mut dyn WorldHost,
    ) -> Result<i64, TradeError> {
        if let Some(existing) = self.sessions.get(&(crafter_id, actor)) {
            return Ok(existing.ask());
        }
        let crafter = self
            .crafters
            .get(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        let Some(job) = crafter.workbook.oldest_done_for(actor) else {
            if crafter.workbook.has_job_for(actor) {
                host.post_message(crafter_id, "I am still working on your order.");
            }
            return Err(TradeError::NoCompletedWork);
        };
        let ask = job.price_charged();
        let item = job.item();
        self.sessions
            .insert((crafter_id, actor), TradeSession::open(crafter_id, actor, item, ask));
        host.post_message(crafter_id, &format!("That will be {ask} irons."));
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::TradeOpened,
            format!("item={item} counterparty={actor} ask={ask}"),
        ));
        Ok(ask)
    }

    /// Counterparty places currency against the ask. Acceptance settles
    /// the payout split, returns change, delivers the item, and removes
    /// the job; a short offer rejects and leaves the job queued.
    pub fn offer_payment(
        &mut self,
        crafter_id: CreatureId,
        actor: CreatureId,
        coins: i64,
        host: &mut dyn WorldHost,
    ) -> Result<SessionOutcome, TradeError> {
        let mut session = self
            .sessions
            .remove(&(crafter_id, actor))
            .ok_or(TradeError::NoSession)?;
        let item = session.item();

        // The underlying item vanished mid-session: abort, hand back the
        // stake, and void the job. A done job never re-enters the work
        // loop, so it must be dropped here or it blocks the customer's
        // later collections forever.
        if host.item_quality(item).is_none() {
            session.abort();
            if coins > 0 {
                host.give_coins(actor, coins);
            }
            self.release_bound_forge(crafter_id);
            self.events.push(WorkEvent::with_detail(
                self.tick,
                crafter_id,
                WorkEventKind::TradeAborted,
                format!("item={item} unavailable mid-session"),
            ));
            if let Some(crafter) = self.crafters.get_mut(&crafter_id) {
                if crafter.workbook.remove(item).is_ok() {
                    self.events.push(WorkEvent::with_detail(
                        self.tick,
                        crafter_id,
                        WorkEventKind::ItemLost,
                        format!("item={item}"),
                    ));
                    self.events.push(WorkEvent::with_detail(
                        self.tick,
                        crafter_id,
                        WorkEventKind::JobRemoved,
                        format!("item={item}"),
                    ));
                }
            }
            return Err(TradeError::ItemUnavailable(item));
        }

        let outcome = match session.offer(coins) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.sessions.insert((crafter_id, actor), session);
                return Err(TradeError::Session(err));
            }
        };

        match outcome {
            SessionOutcome::Rejected { shortfall } => {
                // The kernel holds the stake for the session's duration;
                // a rejected offer returns it whole.
                if coins > 0 {
                    host.give_coins(actor, coins);
                }
                self.events.push(WorkEvent::with_detail(
                    self.tick,
                    crafter_id,
                    WorkEventKind::TradeRejected,
                    format!("item={item} short by {shortfall}"),
                ));
                session.close();
                Ok(outcome)
            }
            SessionOutcome::Accepted { change } => {
                let price = session.ask();
                match self
                    .ledger
                    .settle(crafter_id, price, coins, &self.config, self.tick)
                {
                    Err(SettlementError::InsufficientFunds { required, offered }) => {
                        // Stake re-check failed: revert to Rejected and
                        // return the stake.
                        session.revert_to_rejected();
                        session.close();
                        if coins > 0 {
                            host.give_coins(actor, coins);
                        }
                        self.events.push(WorkEvent::with_detail(
                            self.tick,
                            crafter_id,
                            WorkEventKind::TradeRejected,
                            format!("item={item} insufficient funds at settlement"),
                        ));
                        Ok(SessionOutcome::Rejected {
                            shortfall: required - offered,
                        })
                    }
                    Err(err) => {
                        self.sessions.insert((crafter_id, actor), session);
                        Err(TradeError::Settlement(err))
                    }
                    Ok(split) => {
                        self.events.push(WorkEvent::with_detail(
                            self.tick,
                            crafter_id,
                            WorkEventKind::TradeAccepted,
                            format!("item={item} price={price} change={change}"),
                        ));
                        self.events.push(WorkEvent::with_detail(
                            self.tick,
                            crafter_id,
                            WorkEventKind::PayoutApplied,
                            format!("to_owner={} to_tax={}", split.to_owner, split.to_tax),
                        ));
                        if split.upkeep_withheld > 0 {
                            self.events.push(WorkEvent::with_detail(
                                self.tick,
                                crafter_id,
                                WorkEventKind::UpkeepWithheld,
                                format!("consumed={}", split.upkeep_withheld),
                            ));
                        }
                        if change > 0 {
                            host.give_coins(actor, change);
                        }
                        self.deliver_and_remove(crafter_id, actor, item, host)?;
                        session.close();
                        Ok(outcome)
                    }
                }
            }
        }
    }

    /// Counterparty explicitly declines the ask. The job stays queued.
    pub fn decline(
        &mut self,
        crafter_id: CreatureId,
        actor: CreatureId,
        host: &mut dyn WorldHost,
    ) -> Result<(), TradeError> {
        let mut session = self
            .sessions
            .remove(&(crafter_id, actor))
            .ok_or(TradeError::NoSession)?;
        session.decline()?;
        session.close();
        host.post_message(crafter_id, "Very well, come back when you are ready.");
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::TradeRejected,
            format!("item={} declined by {actor}", session.item()),
        ));
        Ok(())
    }

    /// Party disconnect: abort every session with this counterparty.
    /// Resources are released before control returns; job state is left
    /// exactly as it was before each session opened.
    pub fn disconnect(&mut self, actor: CreatureId, _host: &mut dyn WorldHost) {
        let keys: Vec<(CreatureId, CreatureId)> = self
            .sessions
            .keys()
            .filter(|(_, counterparty)| *counterparty == actor)
            .copied()
            .collect();
        for key in keys {
            if let Some(mut session) = self.sessions.remove(&key) {
                session.abort();
                self.release_bound_forge(key.0);
                self.events.push(WorkEvent::with_detail(
                    self.tick,
                    key.0,
                    WorkEventKind::TradeAborted,
                    format!("counterparty {actor} disconnected"),
                ));
            }
        }
    }

    /// Administrative contract handover: rewrites the settlement owner
    /// pointer only. In-flight sessions keep their party references.
    pub fn transfer_contract(
        &mut self,
        crafter_id: CreatureId,
        new_owner: CreatureId,
        host: &mut dyn WorldHost,
    ) -> Result<CreatureId, TradeError> {
        let previous = self.ledger.set_owner(crafter_id, new_owner)?;
        let name = self
            .crafters
            .get(&crafter_id)
            .map(|crafter| crafter.name.clone())
            .unwrap_or_else(|| format!("crafter {crafter_id}"));
        host.post_message(crafter_id, &format!("{name} is now controlled by {new_owner}."));
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::OwnerChanged,
            format!("previous={previous} new={new_owner}"),
        ));
        Ok(previous)
    }

    // -- agent loop ---------------------------------------------------------

    /// One scheduler tick: every crafter advances its head job by one
    /// work step. Runs on its own cadence, independent of request
    /// handling; nothing here blocks and nothing here is fatal.
    pub fn tick(&mut self, host: &mut dyn WorldHost) {
        self.tick = self.tick.saturating_add(1);
        let ids: Vec<CreatureId> = self.crafters.keys().copied().collect();
        for id in ids {
            if let Err(failure) = self.work_crafter(id, host) {
                self.events.push(WorkEvent::with_detail(
                    self.tick,
                    id,
                    WorkEventKind::TickFailure,
                    failure,
                ));
            }
        }
    }

    pub fn tick_n(&mut self, host: &mut dyn WorldHost, n: u64) {
        for _ in 0..n {
            self.tick(host);
        }
    }

    /// Advance one crafter by one tick. Deferral reasons are recorded as
    /// events and retried next tick; `Err` is reserved for unexpected
    /// failures, which are logged and also retried.
    fn work_crafter(
        &mut self,
        id: CreatureId,
        host: &mut dyn WorldHost,
    ) -> Result<(), String> {
        let tick = self.tick;

        let Some(crafter) = self.crafters.get(&id) else {
            return Ok(());
        };
        let Some(forge) = crafter.workbook.forge() else {
            return Ok(());
        };
        let Some(job) = crafter.workbook.next_pending() else {
            return Ok(());
        };
        let item = job.item();
        let target = job.target_ql();
        let donation = job.is_donation();
        let mail_when_done = job.mail_when_done();
        let quoted_price = job.price_charged();

        // The bound forge is re-validated every tick; it may have been
        // destroyed externally.
        if !host.forge_exists(forge) {
            self.forges.release(forge, id);
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::ForgeMissing,
                format!("forge={forge}"),
            ));
            return Ok(());
        }

        // Try-acquire: contention defers this tick, never aborts.
        let fresh_hold = self.forges.holder(forge).is_none();
        if let Err(err) = self.forges.acquire(forge, id) {
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::ForgeDeferred,
                err.to_string(),
            ));
            return Ok(());
        }
        if fresh_hold {
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::WorkStarted,
                format!("item={item} forge={forge}"),
            ));
        }

        // Item destroyed externally: irrecoverable, drop the job.
        let Some(current) = host.item_quality(item) else {
            return self.abandon_lost_item(id, forge, item, host);
        };

        if current < target {
            let next = (current + QL_GAIN_PER_TICK).min(target);
            host.set_item_quality(item, next);
            if next < target {
                return Ok(());
            }
        }

        // Target reached.
        if donation {
            let crafter = self
                .crafters
                .get_mut(&id)
                .ok_or_else(|| format!("crafter {id} vanished mid-tick"))?;
            crafter
                .workbook
                .remove(item)
                .map_err(|err| err.to_string())?;
            self.forges.release(forge, id);
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::JobRemoved,
                format!("item={item} donation worked to cap"),
            ));
            return Ok(());
        }

        let crafter = self
            .crafters
            .get_mut(&id)
            .ok_or_else(|| format!("crafter {id} vanished mid-tick"))?;
        crafter
            .workbook
            .mark_done(item, quoted_price)
            .map_err(|err| err.to_string())?;
        self.events.push(WorkEvent::with_detail(
            tick,
            id,
            WorkEventKind::JobCompleted,
            format!("item={item} price={quoted_price}"),
        ));

        if quoted_price == 0 && mail_when_done {
            // No payment required: ship directly.
            let job = crafter
                .workbook
                .remove(item)
                .map_err(|err| err.to_string())?;
            job.mail_to_customer(host);
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::JobMailed,
                format!("item={item}"),
            ));
            self.events.push(WorkEvent::with_detail(
                tick,
                id,
                WorkEventKind::JobRemoved,
                format!("item={item}"),
            ));
        } else {
            host.post_message(id, &format!("Item {item} is ready for collection."));
        }

        self.forges.release(forge, id);
        Ok(())
    }

    // -- persistence support ------------------------------------------------

    /// Snapshots of every crafter for the run store.
    pub fn snapshots(&self) -> Vec<CrafterSnapshot> {
        self.crafters
            .values()
            .map(|crafter| CrafterSnapshot {
                id: crafter.id,
                name: crafter.name.clone(),
                skill: crafter.skill,
                skill_level: crafter.skill_level,
                owner: self.ledger.owner_of(crafter.id).unwrap_or(0),
                balance: self.ledger.balance_of(crafter.id).unwrap_or(0),
                forge: crafter.workbook.forge(),
                workbook_text: crafter.workbook.encode(),
            })
            .collect()
    }

    /// Rebuild a crafter from a snapshot. Malformed ledger lines are
    /// skipped, logged as `RecordSkipped` events, and do not prevent
    /// startup. Returns the number of skipped lines.
    pub fn restore_crafter(&mut self, snapshot: CrafterSnapshot) -> usize {
        let (workbook, skipped) = WorkBook::decode(&snapshot.workbook_text, self.config.skill_cap);
        let mut workbook = workbook;
        workbook.bind_forge(snapshot.forge);
        for line in &skipped {
            self.events.push(WorkEvent::with_detail(
                self.tick,
                snapshot.id,
                WorkEventKind::RecordSkipped,
                line.clone(),
            ));
        }
        self.crafters.insert(
            snapshot.id,
            Crafter {
                id: snapshot.id,
                name: snapshot.name,
                skill: snapshot.skill,
                skill_level: snapshot.skill_level,
                workbook,
            },
        );
        self.ledger
            .restore_shop(snapshot.id, snapshot.owner, snapshot.balance);
        skipped.len()
    }

    /// Re-seed the authority balances and the tick cursor from persisted
    /// state. Called once at startup, before any new settlement.
    pub fn restore_authority(&mut self, tax_balance: i64, upkeep_consumed: i64, tick: u64) {
        self.ledger.restore_authority(tax_balance, upkeep_consumed);
        self.tick = tick;
    }

    // -- internals ----------------------------------------------------------

    fn release_bound_forge(&mut self, crafter_id: CreatureId) {
        if let Some(forge) = self
            .crafters
            .get(&crafter_id)
            .and_then(|crafter| crafter.workbook.forge())
        {
            self.forges.release(forge, crafter_id);
        }
    }

    fn abandon_lost_item(
        &mut self,
        id: CreatureId,
        forge: ForgeId,
        item: ItemId,
        host: &mut dyn WorldHost,
    ) -> Result<(), String> {
        let crafter = self
            .crafters
            .get_mut(&id)
            .ok_or_else(|| format!("crafter {id} vanished mid-tick"))?;
        crafter
            .workbook
            .remove(item)
            .map_err(|err| err.to_string())?;
        self.forges.release(forge, id);
        host.post_message(id, &format!("Item {item} was lost; the order is void."));
        self.events.push(WorkEvent::with_detail(
            self.tick,
            id,
            WorkEventKind::ItemLost,
            format!("item={item}"),
        ));
        Ok(())
    }

    fn deliver_and_remove(
        &mut self,
        crafter_id: CreatureId,
        actor: CreatureId,
        item: ItemId,
        host: &mut dyn WorldHost,
    ) -> Result<(), TradeError> {
        let crafter = self
            .crafters
            .get_mut(&crafter_id)
            .ok_or(TradeError::UnknownCrafter(crafter_id))?;
        let job = crafter.workbook.remove(item)?;
        if job.mail_when_done() {
            job.mail_to_customer(host);
            self.events.push(WorkEvent::with_detail(
                self.tick,
                crafter_id,
                WorkEventKind::JobMailed,
                format!("item={item}"),
            ));
        } else {
            host.hand_item(item, actor);
            self.events.push(WorkEvent::with_detail(
                self.tick,
                crafter_id,
                WorkEventKind::JobCollected,
                format!("item={item} by={actor}"),
            ));
        }
        self.events.push(WorkEvent::with_detail(
            self.tick,
            crafter_id,
            WorkEventKind::JobRemoved,
            format!("item={item}"),
        ));
        Ok(())
    }
}
