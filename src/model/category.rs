use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The canonical set of expense categories. Every persisted expense has exactly one of these.
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    Eq,
    PartialEq,
    Ord,
    PartialOrd,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    clap::ValueEnum,
)]
pub enum Category {
    Food,
    Transportation,
    Entertainment,
    Shopping,
    Bills,
    Healthcare,
    Education,
    #[default]
    Other,
}

serde_plain::derive_display_from_serialize!(Category);
serde_plain::derive_fromstr_from_deserialize!(Category);

impl Category {
    /// All categories in their canonical order.
    pub const ALL: [Category; 8] = [
        Category::Food,
        Category::Transportation,
        Category::Entertainment,
        Category::Shopping,
        Category::Bills,
        Category::Healthcare,
        Category::Education,
        Category::Other,
    ];

    /// Exact, case-sensitive lookup of a canonical category name.
    pub fn from_canonical(name: &str) -> Option<Category> {
        Self::ALL.into_iter().find(|c| c.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Transportation => "Transportation",
            Category::Entertainment => "Entertainment",
            Category::Shopping => "Shopping",
            Category::Bills => "Bills",
            Category::Healthcare => "Healthcare",
            Category::Education => "Education",
            Category::Other => "Other",
        }
    }

    /// Everyday words that should map to this category. These are given to the model as hints.
    pub fn keywords(&self) -> &'static str {
        match self {
            Category::Food => "food, dining, restaurant, grocery, coffee, lunch, dinner",
            Category::Transportation => "uber, taxi, gas, car, bus, train, parking",
            Category::Entertainment => "movie, concert, game, streaming, fun",
            Category::Shopping => "clothes, shoes, electronics, retail",
            Category::Bills => "rent, utilities, phone, internet, subscriptions",
            Category::Healthcare => "doctor, medicine, pharmacy, hospital",
            Category::Education => "books, course, tuition, school",
            Category::Other => "anything else",
        }
    }

    /// The canonical list as it appears in prompts and error messages:
    /// `Food, Transportation, Entertainment, Shopping, Bills, Healthcare, Education, Other`.
    pub fn canonical_list() -> String {
        Self::ALL
            .iter()
            .map(|c| c.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
