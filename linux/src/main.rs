// Copyright (c) 2024-2025 The Keywarden Project

//! Development-host harness.
//!
//! Impersonates a Ledger Nano X through the Linux USB gadget subsystem
//! and pumps HID reports between `/dev/hidgX` and the wallet core, so
//! the firmware can be driven by real host software (Keplr, ledgerjs)
//! without device hardware.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use log::{info, warn, LevelFilter};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use keywarden_core::{
    apps::{cosmos::Cosmos, Handler},
    crypto::{LocalToken, Token},
    hid::HidHandler,
};
use keywarden_tee::{applet::CryptoApplet, rpc::TrustedOs, token::TeeToken};
use keywarden_transport::{Report, REPORT_LEN};

mod gadget;

/// Linux USB gadget harness for the Keywarden wallet core
#[derive(Clone, Debug, Parser)]
struct Args {
    /// /dev/hidgX file descriptor path
    #[clap(long, default_value = "/dev/hidg0")]
    hidg: PathBuf,

    /// configfs mount point
    #[clap(long, default_value = "/sys/kernel/config")]
    configfs_path: PathBuf,

    /// Tear down existing hidg descriptors and exit
    #[clap(long)]
    clean: bool,

    /// Configure the gadget and exit
    #[clap(long)]
    setup: bool,

    /// Route cryptographic operations through the in-process secure world
    #[clap(long)]
    tee: bool,

    /// Log level
    #[clap(long, default_value = "info")]
    log_level: LevelFilter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let _ = simplelog::SimpleLogger::init(args.log_level, Default::default());

    if args.clean {
        gadget::teardown(&args.configfs_path)?;
        return Ok(());
    }

    if !args.hidg.exists() {
        info!("configuring hidg");
        gadget::configure(&args.configfs_path)?;
    } else {
        info!("hidg already configured, using the pre-existing one");
    }

    if args.setup {
        return Ok(());
    }

    let token: Box<dyn Token> = match args.tee {
        true => {
            info!("cryptographic operations will run in the secure world");

            let mut os = TrustedOs::new();
            os.register_applet(Box::new(CryptoApplet::new()))?;

            Box::new(TeeToken::new(Arc::new(os).nonsecure_rpc()))
        }
        false => Box::new(LocalToken::new()),
    };

    let mut apps = Handler::new();
    apps.register(Box::new(Cosmos::new(token)))?;

    let mut hid = HidHandler::new(apps);

    let reader = tokio::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&args.hidg)
        .await
        .with_context(|| format!("cannot open {}", args.hidg.display()))?;

    // Responses go out through a second handle so the loops stay independent
    let writer = tokio::fs::OpenOptions::new()
        .write(true)
        .open(&args.hidg)
        .await
        .with_context(|| format!("cannot open {} for writing", args.hidg.display()))?;

    info!("done, polling...");

    let (report_queue, mut pending_reports) = mpsc::channel::<Report>(64);

    // 50ms delay in both rx and tx, we don't wanna burn laptop cpus
    let mut rx_task = tokio::spawn(async move {
        let mut file = reader;
        let mut report = [0u8; REPORT_LEN];

        loop {
            tokio::time::sleep(Duration::from_millis(50)).await;

            if let Err(e) = file.read_exact(&mut report).await {
                warn!("rx error: {e}");
                continue;
            }

            hid.rx(&report);

            while let Some(outbound) = hid.tx() {
                if report_queue.send(outbound).await.is_err() {
                    return;
                }
            }
        }
    });

    let mut tx_task = tokio::spawn(async move {
        let mut file = writer;

        while let Some(report) = pending_reports.recv().await {
            tokio::time::sleep(Duration::from_millis(50)).await;

            if let Err(e) = file.write_all(&report).await {
                warn!("tx error: {e}");
            }
        }
    });

    info!("running...");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("exiting, call this binary with '--clean' to remove the gadget entries");
        }
        _ = &mut rx_task => warn!("receive loop terminated"),
        _ = &mut tx_task => warn!("transmit loop terminated"),
    }

    rx_task.abort();
    tx_task.abort();

    Ok(())
}
