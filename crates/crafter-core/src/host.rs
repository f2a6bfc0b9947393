//! The host boundary: the explicit collaborator interface the kernel
//! calls back into. The host calls the kernel through `CrafterWorld`
//! entry points; the kernel calls the host only through this trait.

use std::collections::{BTreeMap, BTreeSet};

use contracts::{CreatureId, ForgeId, ItemId};

/// Injected world collaborator. Implemented by the hosting engine; the
/// kernel never reaches into host state any other way.
pub trait WorldHost {
    /// Current quality of an item, or `None` if it no longer exists.
    fn item_quality(&self, item: ItemId) -> Option<f32>;

    fn set_item_quality(&mut self, item: ItemId, quality: f32);

    /// Whether the forge still exists. The bound forge is re-validated,
    /// never assumed present — it may be destroyed externally.
    fn forge_exists(&self, forge: ForgeId) -> bool;

    /// Deliver an item through the mail system.
    fn mail_item(&mut self, item: ItemId, to: CreatureId);

    /// Hand an item over directly.
    fn hand_item(&mut self, item: ItemId, to: CreatureId);

    fn give_coins(&mut self, to: CreatureId, amount: i64);

    /// Post a chat message on behalf of a crafter.
    fn post_message(&mut self, from: CreatureId, text: &str);
}

/// In-memory host used by the CLI demo and the test suite.
#[derive(Debug, Default)]
pub struct MemoryHost {
    items: BTreeMap<ItemId, f32>,
    forges: BTreeSet<ForgeId>,
    mailbox: Vec<(ItemId, CreatureId)>,
    handed: Vec<(ItemId, CreatureId)>,
    coins: BTreeMap<CreatureId, i64>,
    messages: Vec<(CreatureId, String)>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, item: ItemId, quality: f32) {
        self.items.insert(item, quality);
    }

    pub fn destroy_item(&mut self, item: ItemId) {
        self.items.remove(&item);
    }

    pub fn add_forge(&mut self, forge: ForgeId) {
        self.forges.insert(forge);
    }

    pub fn destroy_forge(&mut self, forge: ForgeId) {
        self.forges.remove(&forge);
    }

    pub fn mailbox(&self) -> &[(ItemId, CreatureId)] {
        &self.mailbox
    }

    pub fn handed(&self) -> &[(ItemId, CreatureId)] {
        &self.handed
    }

    pub fn coins_of(&self, creature: CreatureId) -> i64 {
        self.coins.get(&creature).copied().unwrap_or(0)
    }

    pub fn messages(&self) -> &[(CreatureId, String)] {
        &self.messages
    }
}

impl WorldHost for MemoryHost {
    fn item_quality(&self, item: ItemId) -> Option<f32> {
        self.items.get(&item).copied()
    }

    fn set_item_quality(&mut self, item: ItemId, quality: f32) {
        if let Some(current) = self.items.get_mut(&item) {
            *current = quality;
        }
    }

    fn forge_exists(&self, forge: ForgeId) -> bool {
        self.forges.contains(&forge)
    }

    fn mail_item(&mut self, item: ItemId, to: CreatureId) {
        if self.items.contains_key(&item) {
            self.mailbox.push((item, to));
        }
    }

    fn hand_item(&mut self, item: ItemId, to: CreatureId) {
        if self.items.contains_key(&item) {
            self.handed.push((item, to));
        }
    }

    fn give_coins(&mut self, to: CreatureId, amount: i64) {
        *self.coins.entry(to).or_insert(0) += amount;
    }

    fn post_message(&mut self, from: CreatureId, text: &str) {
        self.messages.push((from, text.to_string()));
    }
}
