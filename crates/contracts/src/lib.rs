//! Cross-boundary contracts for the crafter service kernel: identifiers,
//! configuration, payment policy, status DTOs, and work events.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub mod serde_u64_string;

/// Identity of a physical item in the host world. Externally owned.
pub type ItemId = u64;

/// Identity of a creature in the host world: crafters, customers, owners.
pub type CreatureId = u64;

/// Identity of a heat source (forge) in the host world.
pub type ForgeId = u64;

/// Customer identity denoting "no payment claimant" (donations).
pub const NO_CUSTOMER: CreatureId = 0;

/// One copper coin expressed in irons, the smallest currency unit.
pub const COIN_COPPER: i64 = 100;

/// Hard ceiling on any skill target. Values at 100 would be rejected by
/// the host skill system, so the cap sits just below it.
pub const SKILL_CAP_LIMIT: f32 = 99.99999;

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

/// Craft skills a crafter can be hired for. Each maps to a configurable
/// price multiplier; unconfigured skills multiply by 1.0.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SkillType {
    Blacksmithing,
    Weaponsmithing,
    Jewelrysmithing,
    Chainsmithing,
    Platesmithing,
    Carpentry,
    FineCarpentry,
    Fletching,
    Bowyery,
    Leatherworking,
    Clothtailoring,
    Stonecutting,
    DragonArmour,
}

impl fmt::Display for SkillType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Blacksmithing => "blacksmithing",
            Self::Weaponsmithing => "weaponsmithing",
            Self::Jewelrysmithing => "jewelrysmithing",
            Self::Chainsmithing => "chainsmithing",
            Self::Platesmithing => "platesmithing",
            Self::Carpentry => "carpentry",
            Self::FineCarpentry => "fine_carpentry",
            Self::Fletching => "fletching",
            Self::Bowyery => "bowyery",
            Self::Leatherworking => "leatherworking",
            Self::Clothtailoring => "clothtailoring",
            Self::Stonecutting => "stonecutting",
            Self::DragonArmour => "dragon_armour",
        };
        write!(f, "{label}")
    }
}

impl SkillType {
    /// All skills, in configuration-file order.
    pub const ALL: [SkillType; 13] = [
        Self::Blacksmithing,
        Self::Weaponsmithing,
        Self::Jewelrysmithing,
        Self::Chainsmithing,
        Self::Platesmithing,
        Self::Carpentry,
        Self::FineCarpentry,
        Self::Fletching,
        Self::Bowyery,
        Self::Leatherworking,
        Self::Clothtailoring,
        Self::Stonecutting,
        Self::DragonArmour,
    ];

    pub fn parse(raw: &str) -> Option<SkillType> {
        Self::ALL
            .iter()
            .copied()
            .find(|skill| skill.to_string() == raw)
    }
}

// ---------------------------------------------------------------------------
// Payment policy
// ---------------------------------------------------------------------------

/// Where settled payments go.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentPolicy {
    /// The full price is credited to the crafter's owner.
    ForOwner,
    /// An upkeep percentage is withheld (consumed) before crediting the owner.
    TaxAndUpkeep,
    /// The full price goes to the tax authority; the owner receives nothing.
    AllTax,
}

impl fmt::Display for PaymentPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForOwner => write!(f, "for_owner"),
            Self::TaxAndUpkeep => write!(f, "tax_and_upkeep"),
            Self::AllTax => write!(f, "all_tax"),
        }
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Immutable service configuration, constructed once at startup and passed
/// by reference into every component that needs it. No ambient globals.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CrafterConfig {
    pub payment: PaymentPolicy,
    /// Percentage of each settled price withheld under `tax_and_upkeep`.
    pub upkeep_percentage: f32,
    /// Base rate every quote is scaled from, in irons per uplift unit.
    pub base_price: f32,
    /// Surcharge in irons for orders delivered by mail.
    pub mail_price: i64,
    /// Skill level newly hired crafters start at.
    pub starting_skill: f32,
    /// Highest quality any order may target. Min-clamped against
    /// [`SKILL_CAP_LIMIT`] during normalization.
    pub skill_cap: f32,
    #[serde(default)]
    pub skill_prices: BTreeMap<SkillType, f32>,
    /// Actors with power at or above this threshold may open an assigned
    /// forge (with a warning); everyone else is blocked.
    pub forge_override_power: u8,
}

impl Default for CrafterConfig {
    fn default() -> Self {
        let mut skill_prices = BTreeMap::new();
        skill_prices.insert(SkillType::DragonArmour, 10.0);
        Self {
            payment: PaymentPolicy::ForOwner,
            upkeep_percentage: 25.0,
            base_price: 1.0,
            mail_price: COIN_COPPER,
            starting_skill: 20.0,
            skill_cap: SKILL_CAP_LIMIT,
            skill_prices,
            forge_override_power: 2,
        }
    }
}

impl CrafterConfig {
    /// Clamp loaded values into their valid ranges. Returns one warning
    /// string per adjusted field; callers record them as events.
    pub fn normalize(&mut self) -> Vec<String> {
        let defaults = CrafterConfig::default();
        let mut warnings = Vec::new();

        if self.skill_cap > SKILL_CAP_LIMIT || !self.skill_cap.is_finite() {
            warnings.push(format!(
                "skill_cap {} above limit, capping at {SKILL_CAP_LIMIT}",
                self.skill_cap
            ));
            self.skill_cap = SKILL_CAP_LIMIT;
        }
        if self.skill_cap <= 0.0 {
            warnings.push(format!("skill_cap must be positive, using {SKILL_CAP_LIMIT}"));
            self.skill_cap = SKILL_CAP_LIMIT;
        }
        if self.starting_skill > self.skill_cap {
            warnings.push(format!(
                "starting_skill {} above skill_cap, capping at {}",
                self.starting_skill, self.skill_cap
            ));
            self.starting_skill = self.skill_cap;
        }
        if self.upkeep_percentage <= 0.0 || !self.upkeep_percentage.is_finite() {
            warnings.push(format!(
                "upkeep_percentage must be positive, using {}",
                defaults.upkeep_percentage
            ));
            self.upkeep_percentage = defaults.upkeep_percentage;
        }
        if self.base_price <= 0.0 || !self.base_price.is_finite() {
            warnings.push(format!(
                "base_price must be positive, using {}",
                defaults.base_price
            ));
            self.base_price = defaults.base_price;
        }
        if self.mail_price < 0 {
            warnings.push(format!(
                "mail_price must not be negative, using {}",
                defaults.mail_price
            ));
            self.mail_price = defaults.mail_price;
        }

        warnings
    }

    /// Price multiplier for a skill; 1.0 when unconfigured.
    pub fn price_multiplier(&self, skill: SkillType) -> f32 {
        self.skill_prices.get(&skill).copied().unwrap_or(1.0)
    }

    /// Upkeep share as a fraction in `[0, 1]`.
    pub fn upkeep_fraction(&self) -> f64 {
        f64::from(self.upkeep_percentage) / 100.0
    }
}

// ---------------------------------------------------------------------------
// Status DTOs
// ---------------------------------------------------------------------------

/// One row of the read-only queue listing exposed to status collaborators.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobStatusEntry {
    #[serde(with = "serde_u64_string")]
    pub item: ItemId,
    pub donation: bool,
    pub done: bool,
    /// Set once the job has been priced at completion.
    pub price_charged: Option<i64>,
}

// ---------------------------------------------------------------------------
// Work events
// ---------------------------------------------------------------------------

/// Everything the kernel logs. Appended to the world event log and
/// persisted by the run store; there is no other logging channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorkEventKind {
    ConfigAdjusted,
    OrderSubmitted,
    DonationRecorded,
    WorkStarted,
    ForgeDeferred,
    ForgeMissing,
    ItemLost,
    JobCompleted,
    JobMailed,
    JobCollected,
    JobRemoved,
    TradeOpened,
    TradeAccepted,
    TradeRejected,
    TradeAborted,
    PayoutApplied,
    UpkeepWithheld,
    OrderCancelled,
    StakeReturned,
    OwnerChanged,
    RecordSkipped,
    TickFailure,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkEvent {
    pub tick: u64,
    #[serde(with = "serde_u64_string")]
    pub crafter: CreatureId,
    pub kind: WorkEventKind,
    pub detail: Option<String>,
}

impl WorkEvent {
    pub fn new(tick: u64, crafter: CreatureId, kind: WorkEventKind) -> Self {
        Self {
            tick,
            crafter,
            kind,
            detail: None,
        }
    }

    pub fn with_detail(
        tick: u64,
        crafter: CreatureId,
        kind: WorkEventKind,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            tick,
            crafter,
            kind,
            detail: Some(detail.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_policy_round_trips_snake_case() {
        let json = serde_json::to_string(&PaymentPolicy::TaxAndUpkeep).expect("serialize");
        assert_eq!(json, "\"tax_and_upkeep\"");
        let parsed: PaymentPolicy = serde_json::from_str("\"all_tax\"").expect("deserialize");
        assert_eq!(parsed, PaymentPolicy::AllTax);
    }

    #[test]
    fn skill_type_parses_its_own_display() {
        for skill in SkillType::ALL {
            assert_eq!(SkillType::parse(&skill.to_string()), Some(skill));
        }
        assert_eq!(SkillType::parse("necromancy"), None);
    }

    #[test]
    fn default_config_passes_normalization_untouched() {
        let mut config = CrafterConfig::default();
        assert!(config.normalize().is_empty());
        assert_eq!(config, CrafterConfig::default());
    }

    #[test]
    fn normalize_caps_skill_values() {
        let mut config = CrafterConfig {
            skill_cap: 120.0,
            starting_skill: 110.0,
            ..CrafterConfig::default()
        };
        let warnings = config.normalize();
        assert_eq!(warnings.len(), 2);
        assert_eq!(config.skill_cap, SKILL_CAP_LIMIT);
        assert_eq!(config.starting_skill, SKILL_CAP_LIMIT);
    }

    #[test]
    fn normalize_restores_defaults_for_non_positive_rates() {
        let mut config = CrafterConfig {
            upkeep_percentage: -5.0,
            base_price: 0.0,
            ..CrafterConfig::default()
        };
        let warnings = config.normalize();
        assert_eq!(warnings.len(), 2);
        assert_eq!(config.upkeep_percentage, 25.0);
        assert_eq!(config.base_price, 1.0);
    }

    #[test]
    fn unconfigured_skill_multiplier_is_one() {
        let config = CrafterConfig::default();
        assert_eq!(config.price_multiplier(SkillType::Carpentry), 1.0);
        assert_eq!(config.price_multiplier(SkillType::DragonArmour), 10.0);
    }
}
