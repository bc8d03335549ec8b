use std::{path::PathBuf, sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use sqlx::types::time;

use gatecheck::core::db::ScanDb;
use gatecheck::core::generate_code;
use gatecheck::core::invitation::{InvitationGrant, INVITATION_CODE_LEN};
use gatecheck::web;

#[derive(Parser, Debug)]
#[command(name = "gatecheck")]
#[command(version = "0.1")]
#[command(about = "QR-based attendance verification for events.", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: RunType,
}

#[derive(Subcommand, Debug)]
enum RunType {
    /// Create and initialize a new attendance database.
    Init { db_file: PathBuf },

    /// Issue a scanning invitation code for an event and print it.
    /// The code can be handed to volunteers to open scanning sessions.
    Invite {
        db_file: PathBuf,

        /// The event the code is scoped to.
        #[arg(short, long)]
        event: i64,

        /// Validity of the code in hours.
        #[arg(long, default_value_t = 24)]
        hours: u64,

        /// Reference to the issuing admin, recorded for audit.
        #[arg(long)]
        issued_by: Option<String>,
    },

    /// Serve the scanning API against an existing database.
    Serve {
        db_file: PathBuf,

        #[arg(short, long, default_value_t = 28015)]
        port: u16,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        RunType::Init { db_file } => {
            ScanDb::create(&db_file).await?;
            println!("Initialized attendance database at {}", db_file.display());
            Ok(())
        }
        RunType::Invite {
            db_file,
            event,
            hours,
            issued_by,
        } => {
            let db = ScanDb::open(&db_file).await?;
            let event = db.get_event(event).await?;

            let grant = InvitationGrant {
                code: generate_code(INVITATION_CODE_LEN),
                event: event.id,
                issued_by,
                expires_at: time::OffsetDateTime::now_utc()
                    + Duration::from_secs(hours * 60 * 60),
                revoked: false,
            };
            db.add_invitation(&grant).await?;

            println!(
                "Invitation {} for \"{}\" valid for {} hours",
                grant.code, event.name, hours
            );
            Ok(())
        }
        RunType::Serve { db_file, port } => {
            let db = Arc::new(ScanDb::open(&db_file).await?);
            web::run_http_server(db, port).await
        }
    }
}
