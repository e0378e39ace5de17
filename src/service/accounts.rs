use tracing::{info, warn};

use super::sessions::release_slot;
use super::{Marketplace, Notice};
use crate::access::{AccessDenied, Caller, Role, authorize};
use crate::account::{Holdings, NewUser, User};
use crate::booking::SessionBooking;
use crate::error::{ServiceError, ServiceResult};
use crate::order::Order;
use crate::store::{self, abort, key, tx_fetch, tx_get, tx_put, tx_remove};
use crate::types::TimeStamp;
use crate::utils::{USER_HRP, new_record_id};

impl Marketplace {
    /// Register a new account. Regular users are approved immediately.
    pub fn register(&self, form: NewUser) -> ServiceResult<User> {
        let user = self.insert_user(form.validate_and_finalise(new_record_id(USER_HRP))?)?;
        info!(user_id = %user.id, role = %user.role, "registered user");
        Ok(user)
    }

    fn insert_user(&self, user: User) -> ServiceResult<User> {
        let username = user.username.to_lowercase();
        let email = user.email.to_lowercase();

        self.store.transact(|tx| {
            if tx.get(key(store::USERNAME, &username).as_bytes())?.is_some() {
                return abort(ServiceError::conflict("username already taken"));
            }
            if tx.get(key(store::EMAIL, &email).as_bytes())?.is_some() {
                return abort(ServiceError::conflict("email already registered"));
            }
            tx.insert(key(store::USERNAME, &username).as_bytes(), user.id.as_bytes())?;
            tx.insert(key(store::EMAIL, &email).as_bytes(), user.id.as_bytes())?;
            tx_put(tx, &key(store::USER, &user.id), &user)
        })?;
        Ok(user)
    }

    /// Creates the first admin account when none exists yet. Returns the admin either way.
    pub fn ensure_admin(&self, username: &str, email: &str) -> ServiceResult<User> {
        if let Some(admin) = self
            .store
            .scan(store::USER, |u: &User| u.role == Role::Admin)?
            .into_iter()
            .next()
        {
            return Ok(admin);
        }
        let mut admin = NewUser::new()
            .set_username(username)
            .set_email(email)
            .set_role(Role::Admin)
            .set_name("Admin", "User")
            .validate_and_finalise(new_record_id(USER_HRP))?;
        admin.is_approved = true;
        let admin = self.insert_user(admin)?;

        info!(user_id = %admin.id, "created default admin");
        Ok(admin)
    }

    pub fn user(&self, user_id: &str) -> ServiceResult<User> {
        self.store.fetch("user", store::USER, user_id)
    }

    pub fn user_by_username(&self, username: &str) -> ServiceResult<User> {
        let id = self
            .store
            .lookup(store::USERNAME, &username.to_lowercase())?
            .ok_or_else(|| ServiceError::not_found("user", username))?;
        self.user(&id)
    }

    /// Applies the login gate and stamps `last_login`.
    pub fn login(&self, user_id: &str) -> ServiceResult<Caller> {
        let user = self.store.transact(|tx| {
            let mut user: User = tx_fetch(tx, "user", store::USER, user_id)?;
            if let Err(denied) = user.check_login() {
                return abort(denied);
            }
            user.last_login = Some(TimeStamp::new());
            tx_put(tx, &key(store::USER, user_id), &user)?;
            Ok(user)
        });

        match user {
            Ok(user) => Ok(user.caller()),
            Err(e) => {
                warn!(user_id, error = %e, "login refused");
                Err(e)
            }
        }
    }

    pub fn approve_user(&self, caller: &Caller, user_id: &str) -> ServiceResult<User> {
        authorize(caller, &[Role::Admin], None)?;
        let notice = Notice::new(
            &caller.user_id,
            user_id,
            "Your Account Has Been Approved".to_string(),
            "Your account has been approved by an administrator. You now have full access to all features."
                .to_string(),
        );

        let user = self.store.transact(|tx| {
            let mut user: User = tx_fetch(tx, "user", store::USER, user_id)?;
            if user.is_approved {
                return abort(ServiceError::conflict("user is already approved"));
            }
            user.is_approved = true;
            tx_put(tx, &key(store::USER, user_id), &user)?;
            notice.write(tx)?;
            Ok(user)
        })?;

        info!(user_id, approved_by = %caller.user_id, "approved user");
        Ok(user)
    }

    pub fn set_active(&self, caller: &Caller, user_id: &str, active: bool) -> ServiceResult<User> {
        authorize(caller, &[Role::Admin], None)?;

        let user = self.store.transact(|tx| {
            let mut user: User = tx_fetch(tx, "user", store::USER, user_id)?;
            user.is_active = active;
            tx_put(tx, &key(store::USER, user_id), &user)?;
            Ok(user)
        })?;

        info!(user_id, active, "changed account activity");
        Ok(user)
    }

    /// Deletes an account. Their messages and session bookings go with it; their orders
    /// stay for the books with the customer reference cleared.
    ///
    /// Everything is found through the account's holdings record inside the commit, so a
    /// message or booking created concurrently either lands before and is removed, or
    /// fails because the account is gone.
    pub fn delete_user(&self, caller: &Caller, user_id: &str) -> ServiceResult<()> {
        authorize(caller, &[Role::Admin], None)?;
        if caller.user_id == user_id {
            return Err(AccessDenied::Forbidden.into());
        }

        let (messages, orders, sessions) = self.store.transact(|tx| {
            let user: User = tx_fetch(tx, "user", store::USER, user_id)?;
            if user.role == Role::Admin {
                return abort(AccessDenied::Forbidden);
            }
            let holdings_key = key(store::HOLDINGS, user_id);
            let holdings: Holdings = tx_get(tx, &holdings_key)?.unwrap_or_default();

            for message_id in &holdings.messages {
                tx_remove(tx, &key(store::MESSAGE, message_id))?;
            }
            let mut orders = 0;
            for order_id in &holdings.orders {
                let order_key = key(store::ORDER, order_id);
                let Some(mut order) = tx_get::<Order>(tx, &order_key)? else {
                    continue;
                };
                if order.customer_id.as_deref() == Some(user_id) {
                    order.customer_id = None;
                    tx_put(tx, &order_key, &order)?;
                    orders += 1;
                }
            }
            let mut sessions = 0;
            for session_id in &holdings.sessions {
                // the other party may have been deleted first
                let session_key = key(store::SESSION, session_id);
                if let Some(session) = tx_get::<SessionBooking>(tx, &session_key)? {
                    release_slot(tx, &session)?;
                    tx_remove(tx, &session_key)?;
                    sessions += 1;
                }
            }

            tx_remove(tx, &key(store::USERNAME, &user.username.to_lowercase()))?;
            tx_remove(tx, &key(store::EMAIL, &user.email.to_lowercase()))?;
            tx_remove(tx, &holdings_key)?;
            tx_remove(tx, &key(store::USER, user_id))?;
            Ok((holdings.messages.len(), orders, sessions))
        })?;

        info!(user_id, messages, orders, sessions, "deleted user");
        Ok(())
    }
}
