//! The fixed catalog of typed relations a connector can carry.
//!
//! Each relation has display text, an icon name from the application's
//! catalog, a color, and a category used to group the connector type
//! editor. The set is closed; hosts render the catalog, the engine only
//! stores the chosen kind on the connector.

use crate::model::Color;
use serde::{Deserialize, Serialize};

/// Grouping for the connector type editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationCategory {
    Family,
    Romance,
    Social,
    Professional,
    Conflict,
    /// Mind-map relations between plot events.
    Plot,
}

impl RelationCategory {
    pub const ALL: &'static [RelationCategory] = &[
        RelationCategory::Family,
        RelationCategory::Romance,
        RelationCategory::Social,
        RelationCategory::Professional,
        RelationCategory::Conflict,
        RelationCategory::Plot,
    ];

    pub fn display(&self) -> &'static str {
        match self {
            RelationCategory::Family => "Family",
            RelationCategory::Romance => "Romance",
            RelationCategory::Social => "Social",
            RelationCategory::Professional => "Professional",
            RelationCategory::Conflict => "Conflict",
            RelationCategory::Plot => "Plot",
        }
    }
}

/// A typed relation between two nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    // Family
    Parent,
    Child,
    Sibling,
    Relative,
    // Romance
    Spouse,
    Lover,
    ExLover,
    Crush,
    // Social
    Friend,
    BestFriend,
    Acquaintance,
    Neighbor,
    // Professional
    Colleague,
    Mentor,
    Student,
    Employer,
    // Conflict
    Rival,
    Enemy,
    Victim,
    // Plot
    Causes,
    Follows,
    Parallels,
}

impl RelationKind {
    pub const ALL: &'static [RelationKind] = &[
        RelationKind::Parent,
        RelationKind::Child,
        RelationKind::Sibling,
        RelationKind::Relative,
        RelationKind::Spouse,
        RelationKind::Lover,
        RelationKind::ExLover,
        RelationKind::Crush,
        RelationKind::Friend,
        RelationKind::BestFriend,
        RelationKind::Acquaintance,
        RelationKind::Neighbor,
        RelationKind::Colleague,
        RelationKind::Mentor,
        RelationKind::Student,
        RelationKind::Employer,
        RelationKind::Rival,
        RelationKind::Enemy,
        RelationKind::Victim,
        RelationKind::Causes,
        RelationKind::Follows,
        RelationKind::Parallels,
    ];

    pub fn category(&self) -> RelationCategory {
        use RelationKind::*;
        match self {
            Parent | Child | Sibling | Relative => RelationCategory::Family,
            Spouse | Lover | ExLover | Crush => RelationCategory::Romance,
            Friend | BestFriend | Acquaintance | Neighbor => RelationCategory::Social,
            Colleague | Mentor | Student | Employer => RelationCategory::Professional,
            Rival | Enemy | Victim => RelationCategory::Conflict,
            Causes | Follows | Parallels => RelationCategory::Plot,
        }
    }

    pub fn display(&self) -> &'static str {
        use RelationKind::*;
        match self {
            Parent => "Parent of",
            Child => "Child of",
            Sibling => "Sibling of",
            Relative => "Relative of",
            Spouse => "Married to",
            Lover => "In love with",
            ExLover => "Former lover of",
            Crush => "Has a crush on",
            Friend => "Friend of",
            BestFriend => "Best friend of",
            Acquaintance => "Acquainted with",
            Neighbor => "Neighbor of",
            Colleague => "Works with",
            Mentor => "Mentor of",
            Student => "Student of",
            Employer => "Employs",
            Rival => "Rival of",
            Enemy => "Enemy of",
            Victim => "Victim of",
            Causes => "Causes",
            Follows => "Follows",
            Parallels => "Parallels",
        }
    }

    pub fn icon(&self) -> &'static str {
        use RelationKind::*;
        match self {
            Parent | Child | Sibling | Relative => "home",
            Spouse => "rings",
            Lover | Crush => "heart",
            ExLover => "heart-broken",
            Friend | BestFriend | Acquaintance | Neighbor => "people",
            Colleague | Employer => "briefcase",
            Mentor | Student => "school",
            Rival | Enemy | Victim => "swords",
            Causes => "arrow-right",
            Follows => "clock",
            Parallels => "equals",
        }
    }

    pub fn color(&self) -> Color {
        match self.category() {
            RelationCategory::Family => Color::rgb8(46, 140, 87),
            RelationCategory::Romance => Color::rgb8(219, 69, 115),
            RelationCategory::Social => Color::rgb8(59, 130, 217),
            RelationCategory::Professional => Color::rgb8(140, 107, 199),
            RelationCategory::Conflict => Color::rgb8(204, 74, 43),
            RelationCategory::Plot => Color::rgb8(115, 115, 128),
        }
    }

    /// Every relation in a category, in catalog order.
    pub fn in_category(category: RelationCategory) -> impl Iterator<Item = RelationKind> {
        Self::ALL
            .iter()
            .copied()
            .filter(move |r| r.category() == category)
    }
}
