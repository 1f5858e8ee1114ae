use clap::{Parser, Subcommand};

pub mod commands;

#[derive(Parser)]
#[command(name = "backlot")]
#[command(about = "Vehicle return processing for rental branches")]
#[command(long_about = "Backlot runs the return desk: intake, condition evidence, damage review, \
                       late fees, closeout, and deposit release, in order, with every completed \
                       step written before the next one opens. Start with 'backlot arrivals' to \
                       see what is due back.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize branch configuration and data directories
    Init {
        /// Overwrite existing configuration
        #[arg(long, help = "Overwrite an existing backlot.toml")]
        force: bool,
        /// Show what would be created without making changes
        #[arg(long, help = "Show what would be created without making changes")]
        dry_run: bool,
    },
    /// Load demo contracts into the configured backend
    Seed {
        /// Load bookings from a JSON file instead of the demo set
        #[arg(long, help = "JSON file holding an array of bookings to load")]
        file: Option<String>,
    },
    /// List contracts due back around now
    Arrivals {
        /// Window size around now
        #[arg(long, default_value = "24", help = "Hours before and after now to include")]
        hours: i64,
    },
    /// Show the full return session for one contract
    Status {
        /// Contract reference, e.g. R-20441
        reference: String,
    },
    /// Step 1: record the vehicle back on the lot
    Intake {
        /// Contract reference
        reference: String,
        /// Odometer reading at return
        #[arg(long, help = "Odometer reading at return, in km")]
        odometer: u32,
        /// Fuel gauge reading
        #[arg(long, help = "Fuel level in eighths, 0 (empty) to 8 (full)")]
        fuel: u8,
        /// Return time override
        #[arg(long, help = "Return time as RFC 3339, defaults to now")]
        at: Option<String>,
    },
    /// Register one condition photo for the evidence step
    Photo {
        /// Contract reference
        reference: String,
        /// Where on the vehicle, e.g. front-left
        label: String,
        /// What the photo shows
        #[arg(
            long,
            default_value = "exterior",
            help = "Photo kind: exterior, interior, odometer, fuel, damage"
        )]
        kind: String,
    },
    /// Step 2: confirm condition photos are on file
    Evidence {
        /// Contract reference
        reference: String,
    },
    /// Step 3: finish the damage review
    Issues {
        /// Contract reference
        reference: String,
    },
    /// Note, list, or clear damage reports
    Damage {
        /// Contract reference
        reference: String,
        /// Note new damage with this description
        #[arg(long, help = "Description of new damage to note")]
        note: Option<String>,
        /// Severity of newly noted damage
        #[arg(long, default_value = "moderate", help = "Severity: cosmetic, moderate, severe")]
        severity: String,
        /// Estimated repair cost of newly noted damage
        #[arg(long, default_value = "0", help = "Estimated repair cost in cents")]
        cost: i64,
        /// Remove an existing damage report instead
        #[arg(long, help = "Remove the damage report with this id")]
        clear: Option<uuid::Uuid>,
    },
    /// Decide the late fee: accept it or override it with a reason
    Fee {
        /// Contract reference
        reference: String,
        /// Amount to charge
        #[arg(long, help = "Amount in cents; omit to accept the calculated fee")]
        amount: Option<i64>,
        /// Why the amount differs from the calculated fee
        #[arg(long, help = "Required whenever the amount differs from the calculated fee")]
        reason: Option<String>,
        /// Correct a fee after closeout
        #[arg(long, help = "Adjust the fee after closeout; always needs --reason")]
        adjust: bool,
    },
    /// Step 4: close out the contract
    Closeout {
        /// Contract reference
        reference: String,
        /// Exception returns must confirm the damage checklist
        #[arg(long, help = "Confirm the damage checklist was walked (exception returns)")]
        confirm_damage_check: bool,
    },
    /// Step 5: release the deposit and complete the contract
    Settle {
        /// Contract reference
        reference: String,
    },
    /// Show the step audit trail for one contract
    Audit {
        /// Contract reference
        reference: String,
    },
}

/// Cents to a dollar string for desk output.
pub fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}

/// Render the step checklist the way the desk screens show it.
pub fn print_gates(gates: &[crate::returns::gating::StepGate]) {
    for gate in gates {
        let marker = if gate.complete {
            "✅"
        } else if gate.current {
            "👉"
        } else if gate.accessible {
            "🟢"
        } else {
            "🔒"
        };
        println!("   {} {}", marker, gate.step.label());
    }
}
