//! Shared fixture for the integration tests: a fresh sled database in a temp dir
//! with one approved account per role.
#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Context;
use don_records::access::{Caller, Role};
use don_records::account::NewUser;
use don_records::catalog::{Beat, Merchandise, NewBeat, NewMerchandise};
use don_records::service::Marketplace;
use don_records::store::Store;
use don_records::types::Cents;
use tempfile::{TempDir, tempdir};

pub struct Fixture {
    pub market: Marketplace,
    pub admin: Caller,
    pub producer: Caller,
    pub artist: Caller,
    pub customer: Caller,
    // keeps the database directory alive for the test's duration
    _dir: TempDir,
}

impl Fixture {
    pub fn new(name: &str) -> anyhow::Result<Self> {
        // Sled locks its directory, so every test gets its own database.
        let dir = tempdir()?;
        let db = sled::open(dir.path().join(format!("{name}.db")))?;
        let market = Marketplace::new(Store::new(Arc::new(db)));

        let admin = market.ensure_admin("admin", "admin@example.com")?;
        let admin = market.login(&admin.id).context("admin login")?;

        let producer = register(&market, "prod", Role::Producer, ("Pro", "Ducer"))?;
        market.approve_user(&admin, &producer)?;
        let artist = register(&market, "artie", Role::Artist, ("Art", "Ist"))?;
        market.approve_user(&admin, &artist)?;
        let customer = register(&market, "fan", Role::User, ("Fan", "Person"))?;

        Ok(Self {
            producer: market.login(&producer)?,
            artist: market.login(&artist)?,
            customer: market.login(&customer)?,
            market,
            admin,
            _dir: dir,
        })
    }

    pub fn beat(&self, title: &str, dollars: u64) -> anyhow::Result<Beat> {
        let beat = self.market.publish_beat(
            &self.producer,
            NewBeat::new()
                .set_title(title)
                .set_price(Cents::from_dollars(dollars))
                .set_audio_file("beats/loop.wav")
                .set_genre("trap")
                .set_bpm(140),
        )?;
        Ok(beat)
    }

    pub fn merch(&self, name: &str, dollars: u64, stock: i64) -> anyhow::Result<Merchandise> {
        let merch = self.market.list_merchandise(
            &self.producer,
            NewMerchandise::new()
                .set_name(name)
                .set_price(Cents::from_dollars(dollars))
                .set_category("apparel")
                .set_stock(stock),
        )?;
        Ok(merch)
    }
}

/// Registers an account and returns its id.
pub fn register(
    market: &Marketplace,
    username: &str,
    role: Role,
    name: (&str, &str),
) -> anyhow::Result<String> {
    let user = market.register(
        NewUser::new()
            .set_username(username)
            .set_email(&format!("{username}@example.com"))
            .set_role(role)
            .set_name(name.0, name.1),
    )?;
    Ok(user.id)
}
