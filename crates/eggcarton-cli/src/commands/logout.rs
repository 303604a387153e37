//! `logout`: forget the stored session

use anyhow::Result;

use eggcarton_core::config::default_data_dir;
use eggcarton_core::config::CREDENTIALS_FILE;
use eggcarton_core::CredentialStore;

pub async fn run() -> Result<()> {
    let store = CredentialStore::new(default_data_dir()?.join(CREDENTIALS_FILE));

    if store.delete().await? {
        eprintln!("Logged out.");
    } else {
        eprintln!("Not logged in.");
    }
    Ok(())
}
