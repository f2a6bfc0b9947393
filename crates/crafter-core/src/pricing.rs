//! Pure price quoting. Deterministic for identical inputs; no side
//! effects — the same function quotes before a session opens and commits
//! at completion.

use contracts::{CrafterConfig, SkillType};

/// Round a non-negative amount to the smallest currency unit, half up.
/// Shared with settlement so owner shares round the same way prices do.
pub fn round_half_up(value: f64) -> i64 {
    (value + 0.5).floor() as i64
}

/// Uplift cost factor for a quality delta: `d · (1 + d/100)`.
/// Strictly increasing in the delta and superlinear — pushing an item
/// from 20 to 90 costs more per point than pushing it from 20 to 50.
pub fn uplift_factor(quality_delta: f32) -> f64 {
    let delta = f64::from(quality_delta.max(0.0));
    delta * (1.0 + delta / 100.0)
}

/// Price in irons for improving by `quality_delta` using `skill`:
/// `base_price × multiplier(skill) × uplift(delta)`, rounded half up.
pub fn price(skill: SkillType, quality_delta: f32, config: &CrafterConfig) -> i64 {
    let raw = f64::from(config.base_price)
        * f64::from(config.price_multiplier(skill))
        * uplift_factor(quality_delta);
    round_half_up(raw)
}

/// Full quote for an order: the improvement price plus the mail surcharge
/// when the finished item is to be mailed.
pub fn quote(
    skill: SkillType,
    current_ql: f32,
    target_ql: f32,
    mail_when_done: bool,
    config: &CrafterConfig,
) -> i64 {
    let base = price(skill, target_ql - current_ql, config);
    if mail_when_done {
        base + config.mail_price
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rounds_half_up() {
        assert_eq!(round_half_up(0.0), 0);
        assert_eq!(round_half_up(1.4), 1);
        assert_eq!(round_half_up(1.5), 2);
        assert_eq!(round_half_up(2.5), 3);
        assert_eq!(round_half_up(10.0), 10);
    }

    #[test]
    fn price_is_deterministic() {
        let config = CrafterConfig::default();
        let first = price(SkillType::Blacksmithing, 37.5, &config);
        let second = price(SkillType::Blacksmithing, 37.5, &config);
        assert_eq!(first, second);
    }

    #[test]
    fn bigger_delta_never_costs_less() {
        let config = CrafterConfig::default();
        let mut last = 0;
        for step in 0..200 {
            let delta = step as f32 * 0.5;
            let quoted = price(SkillType::Carpentry, delta, &config);
            assert!(quoted >= last, "price dropped at delta {delta}");
            last = quoted;
        }
    }

    #[test]
    fn multiplier_scales_the_quote() {
        let mut config = CrafterConfig::default();
        config.skill_prices.insert(SkillType::Weaponsmithing, 2.0);
        let plain = price(SkillType::Blacksmithing, 30.0, &config);
        let doubled = price(SkillType::Weaponsmithing, 30.0, &config);
        assert_eq!(doubled, 2 * plain);
    }

    #[test]
    fn dragon_armour_defaults_to_ten_times() {
        let config = CrafterConfig::default();
        let plain = price(SkillType::Platesmithing, 10.0, &config);
        let dragon = price(SkillType::DragonArmour, 10.0, &config);
        assert_eq!(dragon, 10 * plain);
    }

    #[test]
    fn negative_delta_quotes_zero() {
        let config = CrafterConfig::default();
        assert_eq!(price(SkillType::Carpentry, -5.0, &config), 0);
    }

    #[test]
    fn mail_surcharge_applies_only_when_mailing() {
        let config = CrafterConfig::default();
        let handed = quote(SkillType::Carpentry, 20.0, 50.0, false, &config);
        let mailed = quote(SkillType::Carpentry, 20.0, 50.0, true, &config);
        assert_eq!(mailed, handed + config.mail_price);
    }
}
