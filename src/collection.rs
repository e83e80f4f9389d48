use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CmsError;

/// Whether a collection persists an array of records or a single object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Singleton,
}

impl Shape {
    /// The value a collection falls back to when neither disk nor the
    /// bundled dataset has anything for it.
    pub fn empty_value(self) -> Value {
        match self {
            Shape::List => Value::Array(Vec::new()),
            Shape::Singleton => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Site,
    Articles,
    Categories,
    Experts,
    Research,
    Slides,
    Stats,
    Navigation,
    Newsletter,
    Footer,
    Media,
    Settings,
    Integrations,
    Security,
    Performance,
}

impl Collection {
    pub const ALL: [Collection; 15] = [
        Collection::Site,
        Collection::Articles,
        Collection::Categories,
        Collection::Experts,
        Collection::Research,
        Collection::Slides,
        Collection::Stats,
        Collection::Navigation,
        Collection::Newsletter,
        Collection::Footer,
        Collection::Media,
        Collection::Settings,
        Collection::Integrations,
        Collection::Security,
        Collection::Performance,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Site => "site",
            Collection::Articles => "articles",
            Collection::Categories => "categories",
            Collection::Experts => "experts",
            Collection::Research => "research",
            Collection::Slides => "slides",
            Collection::Stats => "stats",
            Collection::Navigation => "navigation",
            Collection::Newsletter => "newsletter",
            Collection::Footer => "footer",
            Collection::Media => "media",
            Collection::Settings => "settings",
            Collection::Integrations => "integrations",
            Collection::Security => "security",
            Collection::Performance => "performance",
        }
    }

    /// File name inside the content directory, e.g. `articles.json`.
    pub fn file_name(self) -> String {
        format!("{}.json", self.name())
    }

    pub fn shape(self) -> Shape {
        match self {
            Collection::Articles
            | Collection::Categories
            | Collection::Experts
            | Collection::Research
            | Collection::Slides
            | Collection::Media => Shape::List,
            _ => Shape::Singleton,
        }
    }

    pub fn is_list(self) -> bool {
        self.shape() == Shape::List
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = CmsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == wanted)
            .ok_or_else(|| CmsError::UnknownCollection(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip_through_from_str() {
        for collection in Collection::ALL {
            let parsed: Collection = collection.name().parse().unwrap();
            assert_eq!(parsed, collection);
        }
        assert_eq!("Articles".parse::<Collection>().unwrap(), Collection::Articles);
    }

    #[test]
    fn test_unknown_collection_is_rejected() {
        let err = "comments".parse::<Collection>().unwrap_err();
        assert!(matches!(err, CmsError::UnknownCollection(name) if name == "comments"));
    }

    #[test]
    fn test_shapes() {
        let lists: Vec<_> = Collection::ALL.into_iter().filter(|c| c.is_list()).collect();
        assert_eq!(
            lists,
            vec![
                Collection::Articles,
                Collection::Categories,
                Collection::Experts,
                Collection::Research,
                Collection::Slides,
                Collection::Media,
            ]
        );
        assert_eq!(Collection::Site.shape().empty_value(), Value::Null);
        assert_eq!(Collection::Media.shape().empty_value(), Value::Array(vec![]));
        assert_eq!(Collection::Navigation.file_name(), "navigation.json");
    }
}
