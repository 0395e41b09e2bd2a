//! Tier bands over the rating scale
//!
//! Tiers are a cosmetic grouping of ratings into six named bands. Band
//! crossings are what trigger milestone notifications and tier-badge sync,
//! so detection must compare bands, never raw ratings.

use serde::{Deserialize, Serialize};

/// Named rating band, ordered from lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Tier {
    Iron,
    Bronze,
    Silver,
    Gold,
    Platinum,
    Diamond,
}

impl Tier {
    /// Map a rating to its tier band
    pub fn from_rating(rating: i32) -> Self {
        match rating {
            i32::MIN..=999 => Tier::Iron,
            1000..=1199 => Tier::Bronze,
            1200..=1399 => Tier::Silver,
            1400..=1599 => Tier::Gold,
            1600..=1799 => Tier::Platinum,
            _ => Tier::Diamond,
        }
    }

    /// Lowest rating inside this band; `None` for the open-ended bottom band
    pub fn min_rating(&self) -> Option<i32> {
        match self {
            Tier::Iron => None,
            Tier::Bronze => Some(1000),
            Tier::Silver => Some(1200),
            Tier::Gold => Some(1400),
            Tier::Platinum => Some(1600),
            Tier::Diamond => Some(1800),
        }
    }

    /// Band name as shown to players and passed to tier sync
    pub fn name(&self) -> &'static str {
        match self {
            Tier::Iron => "Iron",
            Tier::Bronze => "Bronze",
            Tier::Silver => "Silver",
            Tier::Gold => "Gold",
            Tier::Platinum => "Platinum",
            Tier::Diamond => "Diamond",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Detect a band crossing between two ratings.
///
/// Returns `Some((old_tier, new_tier))` only when the bands differ; a rating
/// change inside one band is not a transition.
pub fn tier_transition(old_rating: i32, new_rating: i32) -> Option<(Tier, Tier)> {
    let old_tier = Tier::from_rating(old_rating);
    let new_tier = Tier::from_rating(new_rating);

    if old_tier != new_tier {
        Some((old_tier, new_tier))
    } else {
        None
    }
}
