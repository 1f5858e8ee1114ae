use std::path::Path;

use anyhow::{anyhow, Result};

use crate::config::BacklotConfig;

/// Sets up a branch workstation: writes `backlot.toml` with the
/// default policy and creates the data and lock directories. Existing
/// configuration is never overwritten without `--force`.
pub struct InitCommand {
    pub force: bool,
    pub dry_run: bool,
}

impl InitCommand {
    pub fn new(force: bool, dry_run: bool) -> Self {
        Self { force, dry_run }
    }

    pub async fn execute(&self) -> Result<()> {
        if self.dry_run {
            println!("⚙️  BACKLOT INIT - Branch Setup (DRY RUN)");
        } else {
            println!("⚙️  BACKLOT INIT - Branch Setup");
        }
        println!("================================");
        println!();

        let settings = BacklotConfig::default();
        let config_path = Path::new("backlot.toml");

        println!("Plan:");
        println!("   📄 backlot.toml          default policy and storage settings");
        println!(
            "   📁 {}/bookings        one JSON document per contract",
            settings.storage.data_dir
        );
        println!(
            "   📁 {}            per-contract session locks",
            settings.branch.lock_dir
        );
        println!();

        if config_path.exists() && !self.force {
            println!("❌ backlot.toml already exists");
            println!("   Use --force to overwrite it with the defaults.");
            return Err(anyhow!("backlot.toml already exists (use --force)"));
        }

        if self.dry_run {
            println!("🔍 Dry run: no files were written.");
            return Ok(());
        }

        settings.save_to_file(config_path)?;
        std::fs::create_dir_all(Path::new(&settings.storage.data_dir).join("bookings"))?;
        std::fs::create_dir_all(&settings.branch.lock_dir)?;

        println!("✅ Branch initialized");
        println!();
        println!("Next steps:");
        println!("   → Set the operator for this shift: export BACKLOT_OPERATOR=m.voss");
        println!("   → Load demo contracts: backlot seed");
        println!("   → See what is due back: backlot arrivals");
        Ok(())
    }
}
