// Copyright (c) 2024-2025 The Keywarden Project

//! Linux USB gadget (configfs) setup with the Ledger Nano X identity.

use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use anyhow::Context;
use log::debug;

/// Ledger Nano X USB identifiers
const VENDOR_ID: &str = "0x2c97";
const PRODUCT_ID: &str = "0x4011";
const DEVICE_RELEASE: &str = "0x0001";

const MANUFACTURER: &str = "Ledger";
const PRODUCT: &str = "Nano X";
const SERIAL: &str = "0001";

/// Gadget directory name under `usb_gadget`
const GADGET_NAME: &str = "keywarden";

/// Ledger Nano X HID report descriptor: vendor-defined usage page with
/// 64-byte input and output reports.
const REPORT_DESCRIPTOR: [u8; 34] = [
    0x06, 0xA0, 0xFF, // Usage Page (vendor defined)
    0x09, 0x01, // Usage (vendor defined)
    0xA1, 0x01, // Collection (Application)
    0x09, 0x03, // Usage (vendor defined)
    0x15, 0x00, // Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x75, 0x08, // Report Size (8 bits)
    0x95, 0x40, // Report Count (64)
    0x81, 0x08, // Input (Data, Array, Absolute)
    0x09, 0x04, // Usage (vendor defined)
    0x15, 0x00, // Logical Minimum (0)
    0x26, 0xFF, 0x00, // Logical Maximum (255)
    0x75, 0x08, // Report Size (8 bits)
    0x95, 0x40, // Report Count (64)
    0x91, 0x08, // Output (Data, Array, Absolute)
    0xC0, // End Collection
];

fn gadget_dir(configfs: &Path) -> PathBuf {
    configfs.join("usb_gadget").join(GADGET_NAME)
}

fn write_value(path: PathBuf, value: impl AsRef<[u8]>) -> anyhow::Result<()> {
    fs::write(&path, value).with_context(|| format!("cannot write {}", path.display()))
}

/// Configure the hidg gadget and bind it to the first available UDC.
pub fn configure(configfs: &Path) -> anyhow::Result<()> {
    let gadget = gadget_dir(configfs);
    debug!("creating gadget at {}", gadget.display());

    fs::create_dir_all(gadget.join("strings/0x409"))
        .with_context(|| format!("cannot create gadget directory {}", gadget.display()))?;

    write_value(gadget.join("idVendor"), VENDOR_ID)?;
    write_value(gadget.join("idProduct"), PRODUCT_ID)?;
    write_value(gadget.join("bcdDevice"), DEVICE_RELEASE)?;

    write_value(gadget.join("strings/0x409/serialnumber"), SERIAL)?;
    write_value(gadget.join("strings/0x409/manufacturer"), MANUFACTURER)?;
    write_value(gadget.join("strings/0x409/product"), PRODUCT)?;

    let function = gadget.join("functions/hid.usb0");
    fs::create_dir_all(&function).context("cannot create hid function")?;

    write_value(function.join("protocol"), "0")?;
    write_value(function.join("subclass"), "0")?;
    write_value(function.join("report_length"), "64")?;
    write_value(function.join("report_desc"), REPORT_DESCRIPTOR)?;

    fs::create_dir_all(gadget.join("configs/c.1/strings/0x409"))
        .context("cannot create gadget configuration")?;
    write_value(
        gadget.join("configs/c.1/strings/0x409/configuration"),
        "config 1",
    )?;

    let link = gadget.join("configs/c.1/hid.usb0");
    if !link.exists() {
        symlink(&function, &link).context("cannot link hid function into configuration")?;
    }

    // Binding to a controller activates the gadget
    write_value(gadget.join("UDC"), first_udc()?)?;

    Ok(())
}

/// Tear down the gadget, reversing [`configure`].
///
/// Partial state is removed best-effort so a failed setup can be
/// cleaned too.
pub fn teardown(configfs: &Path) -> anyhow::Result<()> {
    let gadget = gadget_dir(configfs);

    if !gadget.exists() {
        debug!("no gadget to clean at {}", gadget.display());
        return Ok(());
    }

    let _ = fs::write(gadget.join("UDC"), "\n");
    let _ = fs::remove_file(gadget.join("configs/c.1/hid.usb0"));
    let _ = fs::remove_dir(gadget.join("configs/c.1/strings/0x409"));
    let _ = fs::remove_dir(gadget.join("configs/c.1"));
    let _ = fs::remove_dir(gadget.join("functions/hid.usb0"));
    let _ = fs::remove_dir(gadget.join("strings/0x409"));

    fs::remove_dir(&gadget)
        .with_context(|| format!("cannot remove gadget directory {}", gadget.display()))?;

    Ok(())
}

fn first_udc() -> anyhow::Result<String> {
    let entry = fs::read_dir("/sys/class/udc")
        .context("cannot enumerate usb device controllers")?
        .next()
        .context("no usb device controller available")??;

    Ok(entry.file_name().to_string_lossy().into_owned())
}
