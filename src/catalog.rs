//! Beats and merchandise
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::account::required;
use crate::error::ValidationError;
use crate::types::{Cents, TimeStamp};

#[derive(
    minicbor::Encode,
    minicbor::Decode,
    serde::Serialize,
    serde::Deserialize,
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    #[n(0)]
    Beat,
    #[n(1)]
    Merchandise,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Beat => "beat",
            ItemKind::Merchandise => "merchandise",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "beat" => Ok(ItemKind::Beat),
            "merchandise" => Ok(ItemKind::Merchandise),
            other => Err(ValidationError::invalid("item type", other)),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Beat {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub producer_id: String,
    #[n(2)]
    pub title: String,
    #[n(3)]
    pub price: Cents,
    #[n(4)]
    pub audio_file: String, // path only, bytes live in file storage
    #[n(5)]
    pub genre: Option<String>,
    #[n(6)]
    pub bpm: Option<u32>,
    #[n(7)]
    pub tags: Vec<String>,
    #[n(8)]
    pub is_published: bool,
    #[n(9)]
    pub is_featured: bool,
    #[n(10)]
    pub play_count: u64,
    #[n(11)]
    pub download_count: u64,
    #[n(12)]
    pub created_at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Merchandise {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub seller_id: String,
    #[n(2)]
    pub name: String,
    #[n(3)]
    pub price: Cents,
    #[n(4)]
    pub category: Option<String>,
    #[n(5)]
    pub image: Option<String>,
    #[n(6)]
    pub stock_quantity: i64,
    #[n(7)]
    pub is_published: bool,
    #[n(8)]
    pub is_featured: bool,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
}

impl Beat {
    pub fn record_play(&mut self) {
        self.play_count = self.play_count.saturating_add(1);
    }
    pub fn record_download(&mut self) {
        self.download_count = self.download_count.saturating_add(1);
    }
}

impl Merchandise {
    pub fn has_stock_for(&self, quantity: u32) -> bool {
        self.stock_quantity >= i64::from(quantity)
    }
    pub fn take_stock(&mut self, quantity: u32) {
        self.stock_quantity -= i64::from(quantity);
    }
}

/// Visibility flags an owner or admin may toggle.
#[derive(Debug, Default, Clone, Copy)]
pub struct Visibility {
    pub is_published: Option<bool>,
    pub is_featured: Option<bool>,
}

// Also used for constructing drafts
#[derive(Debug, Default, Clone)]
pub struct NewBeat {
    pub title: Option<String>,
    pub price: Option<Cents>,
    pub audio_file: Option<String>,
    pub genre: Option<String>,
    pub bpm: Option<u32>,
    pub tags: Option<String>, // comma separated
}

impl NewBeat {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
    pub fn set_price(mut self, price: Cents) -> Self {
        self.price = Some(price);
        self
    }
    pub fn set_audio_file(mut self, path: &str) -> Self {
        self.audio_file = Some(path.to_string());
        self
    }
    pub fn set_genre(mut self, genre: &str) -> Self {
        self.genre = Some(genre.to_string());
        self
    }
    pub fn set_bpm(mut self, bpm: u32) -> Self {
        self.bpm = Some(bpm);
        self
    }
    pub fn set_tags(mut self, tags: &str) -> Self {
        self.tags = Some(tags.to_string());
        self
    }

    pub fn validate_and_finalise(self, id: String, producer_id: String) -> Result<Beat, ValidationError> {
        let title = required(self.title, "title")?;
        let audio_file = required(self.audio_file, "audio file")?;
        let price = self.price.ok_or(ValidationError::MissingField("price"))?;
        let tags = self
            .tags
            .map(|t| {
                t.split(',')
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Beat {
            id,
            producer_id,
            title,
            price,
            audio_file,
            genre: self.genre,
            bpm: self.bpm,
            tags,
            is_published: true,
            is_featured: false,
            play_count: 0,
            download_count: 0,
            created_at: TimeStamp::new(),
        })
    }
}

#[derive(Debug, Default, Clone)]
pub struct NewMerchandise {
    pub name: Option<String>,
    pub price: Option<Cents>,
    pub category: Option<String>,
    pub image: Option<String>,
    pub stock_quantity: i64,
}

impl NewMerchandise {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }
    pub fn set_price(mut self, price: Cents) -> Self {
        self.price = Some(price);
        self
    }
    pub fn set_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }
    pub fn set_image(mut self, path: &str) -> Self {
        self.image = Some(path.to_string());
        self
    }
    pub fn set_stock(mut self, quantity: i64) -> Self {
        self.stock_quantity = quantity;
        self
    }

    pub fn validate_and_finalise(
        self,
        id: String,
        seller_id: String,
    ) -> Result<Merchandise, ValidationError> {
        let name = required(self.name, "name")?;
        let price = self.price.ok_or(ValidationError::MissingField("price"))?;
        if self.stock_quantity < 0 {
            return Err(ValidationError::invalid(
                "stock quantity",
                self.stock_quantity.to_string(),
            ));
        }

        Ok(Merchandise {
            id,
            seller_id,
            name,
            price,
            category: self.category,
            image: self.image,
            stock_quantity: self.stock_quantity,
            is_published: true,
            is_featured: false,
            created_at: TimeStamp::new(),
        })
    }
}
