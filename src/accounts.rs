use chrono::{DateTime, Duration, Local};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tracing::info;

use crate::config::AccountsConfig;
use crate::error::{AppError, AppResult};
use crate::model::{now_iso, Account, Actor};
use crate::store::Store;

const MAX_USERNAME_LEN: usize = 50;
const MAX_FULL_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 100;

/// Unsalted single-round SHA-256, hex encoded.
pub fn hash_password(password: &str) -> String {
    format!("{:x}", Sha256::digest(password.as_bytes()))
}

/// Account as shown to callers; the digest never leaves the daemon.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub is_admin: bool,
    pub created_at: String,
    pub created_by: String,
}

impl From<&Account> for AccountView {
    fn from(a: &Account) -> Self {
        AccountView {
            username: a.username.clone(),
            full_name: a.full_name.clone(),
            email: a.email.clone(),
            is_admin: a.is_admin,
            created_at: a.created_at.clone(),
            created_by: a.created_by.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewAccount {
    pub username: String,
    pub full_name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    /// Honoured only when an admin creates the account.
    pub is_admin: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AccountEdit {
    pub full_name: String,
    pub email: String,
    pub is_admin: bool,
    /// Blank keeps the current password.
    pub new_password: String,
    pub confirm_password: String,
}

/// Seeds the configured admin into an empty account collection.
pub fn ensure_default_admin(store: &mut Store, cfg: &AccountsConfig) -> anyhow::Result<bool> {
    if store.accounts.len()? > 0 {
        return Ok(false);
    }
    let admin = Account {
        username: cfg.default_admin_username.clone(),
        password: hash_password(&cfg.default_admin_password),
        is_admin: true,
        email: cfg.default_admin_email.clone(),
        full_name: cfg.default_admin_full_name.clone(),
        created_at: now_iso(),
        created_by: String::new(),
    };
    store.accounts.put(&admin)?;
    info!(username = %admin.username, "seeded default admin account");
    Ok(true)
}

pub fn require_admin(actor: &Actor) -> AppResult<()> {
    if actor.is_admin {
        Ok(())
    } else {
        Err(AppError::forbidden("access denied: administrators only"))
    }
}

fn check_new_password(cfg: &AccountsConfig, password: &str, confirm: &str) -> AppResult<()> {
    if password != confirm {
        return Err(AppError::validation("passwords do not match"));
    }
    if password.chars().count() < cfg.min_password_length {
        return Err(AppError::validation(format!(
            "password must be at least {} characters",
            cfg.min_password_length
        )));
    }
    Ok(())
}

fn check_profile(full_name: &str, email: &str) -> AppResult<()> {
    if full_name.trim().is_empty() || email.trim().is_empty() {
        return Err(AppError::validation("full name and email are required"));
    }
    if !email.contains('@') {
        return Err(AppError::validation("please enter a valid email address"));
    }
    if full_name.chars().count() > MAX_FULL_NAME_LEN || email.chars().count() > MAX_EMAIL_LEN {
        return Err(AppError::validation(format!(
            "full name and email must be at most {MAX_FULL_NAME_LEN} characters"
        )));
    }
    Ok(())
}

fn load(store: &Store, username: &str) -> AppResult<Account> {
    store
        .accounts
        .get(username)?
        .ok_or_else(|| AppError::not_found(format!("user '{username}' not found")))
}

fn insert_new(
    store: &mut Store,
    cfg: &AccountsConfig,
    input: &NewAccount,
    is_admin: bool,
    created_by: &str,
) -> AppResult<Account> {
    let username = input.username.trim();
    check_new_password(cfg, &input.password, &input.confirm_password)?;
    if username.is_empty() {
        return Err(AppError::validation("all fields are required"));
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(AppError::validation(format!(
            "username must be at most {MAX_USERNAME_LEN} characters"
        )));
    }
    check_profile(&input.full_name, &input.email)?;
    if store.accounts.get(username)?.is_some() {
        return Err(AppError::Conflict(format!("username '{username}' already exists")));
    }
    let account = Account {
        username: username.to_string(),
        password: hash_password(&input.password),
        is_admin,
        email: input.email.trim().to_string(),
        full_name: input.full_name.trim().to_string(),
        created_at: now_iso(),
        created_by: created_by.to_string(),
    };
    store.accounts.put(&account)?;
    info!(username = %account.username, is_admin, "account created");
    Ok(account)
}

/// Self-service sign-up; never grants admin rights.
pub fn register(store: &mut Store, cfg: &AccountsConfig, input: &NewAccount) -> AppResult<AccountView> {
    let username = input.username.trim().to_string();
    insert_new(store, cfg, input, false, &username).map(|a| AccountView::from(&a))
}

pub fn authenticate(store: &Store, username: &str, password: &str) -> AppResult<AccountView> {
    match store.accounts.get(username)? {
        Some(a) if a.password == hash_password(password) => Ok(AccountView::from(&a)),
        _ => Err(AppError::AuthFailed("invalid username or password".to_string())),
    }
}

pub fn get(store: &Store, actor: &Actor, username: &str) -> AppResult<AccountView> {
    if actor.username != username {
        require_admin(actor)?;
    }
    load(store, username).map(|a| AccountView::from(&a))
}

pub fn update_profile(store: &mut Store, actor: &Actor, full_name: &str, email: &str) -> AppResult<AccountView> {
    check_profile(full_name, email)?;
    let mut a = load(store, &actor.username)?;
    a.full_name = full_name.trim().to_string();
    a.email = email.trim().to_string();
    store.accounts.put(&a)?;
    info!(username = %a.username, "profile updated");
    Ok(AccountView::from(&a))
}

pub fn change_password(
    store: &mut Store,
    cfg: &AccountsConfig,
    actor: &Actor,
    current: &str,
    new_password: &str,
    confirm: &str,
) -> AppResult<()> {
    let mut a = load(store, &actor.username)?;
    if a.password != hash_password(current) {
        return Err(AppError::AuthFailed("current password is incorrect".to_string()));
    }
    check_new_password(cfg, new_password, confirm)?;
    a.password = hash_password(new_password);
    store.accounts.put(&a)?;
    info!(username = %a.username, "password changed");
    Ok(())
}

/// Outstanding password-reset tokens. They live only in memory.
#[derive(Debug, Default)]
pub struct ResetTokens {
    pending: HashMap<String, (String, DateTime<Local>)>,
}

impl ResetTokens {
    pub fn issue(
        &mut self,
        username: &str,
        ttl_minutes: i64,
        now: DateTime<Local>,
    ) -> AppResult<String> {
        let expires = Duration::try_minutes(ttl_minutes)
            .filter(|ttl| *ttl > Duration::zero())
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| {
                AppError::validation(format!("reset token lifetime out of range: {ttl_minutes} minutes"))
            })?;
        self.pending.retain(|_, (_, expires)| *expires > now);
        let token = uuid::Uuid::new_v4().to_string();
        self.pending.insert(token.clone(), (username.to_string(), expires));
        Ok(token)
    }

    /// Consumes the token; expired and unknown tokens both yield `None`.
    pub fn redeem(&mut self, token: &str, now: DateTime<Local>) -> Option<String> {
        let (username, expires) = self.pending.remove(token)?;
        (expires > now).then_some(username)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.len()
    }
}

pub fn request_reset(
    store: &Store,
    tokens: &mut ResetTokens,
    cfg: &AccountsConfig,
    username: &str,
    email: &str,
) -> AppResult<String> {
    match store.accounts.get(username)? {
        Some(a) if a.email == email => {
            info!(username, "password reset requested");
            tokens.issue(username, cfg.reset_token_minutes, Local::now())
        }
        _ => Err(AppError::AuthFailed("invalid username or email".to_string())),
    }
}

pub fn reset_password(
    store: &mut Store,
    tokens: &mut ResetTokens,
    cfg: &AccountsConfig,
    token: &str,
    new_password: &str,
    confirm: &str,
) -> AppResult<String> {
    check_new_password(cfg, new_password, confirm)?;
    let username = tokens
        .redeem(token, Local::now())
        .ok_or_else(|| AppError::AuthFailed("reset token is invalid or expired".to_string()))?;
    let mut a = load(store, &username)?;
    a.password = hash_password(new_password);
    store.accounts.put(&a)?;
    info!(username = %a.username, "password reset");
    Ok(username)
}

pub fn list(store: &Store, actor: &Actor) -> AppResult<Vec<AccountView>> {
    require_admin(actor)?;
    Ok(store.accounts.list()?.iter().map(AccountView::from).collect())
}

pub fn admin_create(store: &mut Store, cfg: &AccountsConfig, actor: &Actor, input: &NewAccount) -> AppResult<AccountView> {
    require_admin(actor)?;
    insert_new(store, cfg, input, input.is_admin, &actor.username).map(|a| AccountView::from(&a))
}

fn admin_count(store: &Store) -> anyhow::Result<usize> {
    Ok(store.accounts.list_where(&|a: &Account| a.is_admin)?.len())
}

pub fn admin_update(
    store: &mut Store,
    cfg: &AccountsConfig,
    actor: &Actor,
    username: &str,
    edit: &AccountEdit,
) -> AppResult<AccountView> {
    require_admin(actor)?;
    let mut a = load(store, username)?;
    check_profile(&edit.full_name, &edit.email)?;
    if !edit.new_password.is_empty() {
        check_new_password(cfg, &edit.new_password, &edit.confirm_password)?;
    }
    if a.is_admin && !edit.is_admin && admin_count(store)? <= 1 {
        return Err(AppError::forbidden("cannot remove admin rights from the last admin account"));
    }
    a.full_name = edit.full_name.trim().to_string();
    a.email = edit.email.trim().to_string();
    a.is_admin = edit.is_admin;
    if !edit.new_password.is_empty() {
        a.password = hash_password(&edit.new_password);
    }
    store.accounts.put(&a)?;
    info!(username = %a.username, by = %actor.username, "account updated");
    Ok(AccountView::from(&a))
}

pub fn admin_delete(store: &mut Store, actor: &Actor, username: &str) -> AppResult<()> {
    require_admin(actor)?;
    if username == actor.username {
        return Err(AppError::forbidden("cannot delete your own account"));
    }
    let a = load(store, username)?;
    if a.is_admin && admin_count(store)? <= 1 {
        return Err(AppError::forbidden("cannot delete the last admin account"));
    }
    store.accounts.delete(username)?;
    info!(username, by = %actor.username, "account deleted");
    Ok(())
}
