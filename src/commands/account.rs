use anyhow::{Context, Result};

use trailgain::config::Config;
use trailgain::credentials::AccountPool;
use trailgain::models::Account;

use super::open_stores;

pub fn account_add(config: &Config, username: &str, secret: &str) -> Result<()> {
    let username = username.trim();
    anyhow::ensure!(!username.is_empty(), "username must not be empty");
    anyhow::ensure!(!secret.is_empty(), "secret must not be empty");

    let pool = AccountPool::new(open_stores(config)?.accounts);
    pool.add(&Account::new(username, secret))
        .with_context(|| format!("Failed to add account {username}"))?;

    println!("Account '{username}' added");
    Ok(())
}

pub fn account_list(config: &Config) -> Result<()> {
    let pool = AccountPool::new(open_stores(config)?.accounts);
    let usernames = pool.usernames()?;

    if usernames.is_empty() {
        println!("No accounts configured");
        return Ok(());
    }

    println!("Accounts ({}):", usernames.len());
    for username in usernames {
        println!("  {username}");
    }
    Ok(())
}
