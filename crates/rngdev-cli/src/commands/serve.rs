#[cfg(unix)]
use std::io::Write;
#[cfg(unix)]
use std::sync::atomic::{AtomicBool, Ordering};

#[cfg(unix)]
use rngdev_core::{DeviceError, Host, RandomDevice, WriterDestination};

#[cfg(unix)]
pub fn run(root: &str, config_path: Option<&str>, chunk: usize, legacy_zero: bool) {
    use std::os::unix::fs::OpenOptionsExt;
    use std::sync::Arc;

    use rngdev_core::FsHost;

    let config = super::load_config(config_path, legacy_zero);
    let chunk = if chunk > 0 { chunk } else { 4096 };

    let mut device = match RandomDevice::load(FsHost::new(root), &config) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    };
    let Some(identity) = device.identity() else {
        eprintln!("Error: device is not registered");
        std::process::exit(1);
    };
    let node = identity.node().path().to_path_buf();
    let number = identity.number();

    println!(
        "Serving {} ({number}, devt {:#010x}, read_contract={}, chunk={chunk}B)",
        node.display(),
        number.encode(),
        config.read_contract
    );
    println!("Press Ctrl+C to stop.");

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        let node = node.clone();
        let installed = ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
            // A writer blocked in open() waits for a reader; give it one.
            let _ = std::fs::OpenOptions::new()
                .read(true)
                .custom_flags(libc::O_NONBLOCK)
                .open(&node);
        });
        if let Err(e) = installed {
            log::warn!("could not install Ctrl+C handler: {e}");
        }
    }

    while !stop.load(Ordering::SeqCst) {
        let fifo = match std::fs::OpenOptions::new().write(true).open(&node) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                eprintln!("Error opening {}: {e}", node.display());
                break;
            }
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        if let Err(e) = serve_reader(&device, fifo, chunk, &stop) {
            eprintln!("Error: {e}");
            break;
        }
    }

    let stats = device.stats();
    device.unload();
    println!(
        "Stopped after {} open(s), {} bytes served, {} transfer fault(s).",
        stats.opens, stats.bytes_served, stats.transfer_faults
    );
}

/// Serve one reader for the length of a session, then drop `sink`.
///
/// The session ends when the reader closes its end, when `stop` is raised,
/// or when a read reports 0. A reported 0 is end of stream to a reader, so
/// under the legacy contract each reader gets exactly one chunk followed by
/// EOF.
#[cfg(unix)]
fn serve_reader<H: Host, W: Write>(
    device: &RandomDevice<H>,
    sink: W,
    chunk: usize,
    stop: &AtomicBool,
) -> rngdev_core::Result<()> {
    let session = device.open()?;
    let mut dest = WriterDestination(sink);
    while !stop.load(Ordering::SeqCst) {
        match session.read(chunk, &mut dest) {
            Ok(0) => break,
            Ok(_) => {}
            // The reader closed its end.
            Err(DeviceError::TransferFault { .. }) => break,
            Err(e) => {
                log::error!("read failed: {e}");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(not(unix))]
pub fn run(_root: &str, _config_path: Option<&str>, _chunk: usize, _legacy_zero: bool) {
    eprintln!("Named pipes not supported on this platform.");
    std::process::exit(1);
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::io::Read;
    use std::path::PathBuf;

    use rngdev_core::{DeviceConfig, FsHost, ReadContract};

    fn load(root: &std::path::Path, contract: ReadContract) -> (RandomDevice<FsHost>, PathBuf) {
        let config = DeviceConfig {
            read_contract: contract,
            ..DeviceConfig::default()
        };
        let device = RandomDevice::load(FsHost::new(root), &config).unwrap();
        let node = device.identity().unwrap().node().path().to_path_buf();
        (device, node)
    }

    #[test]
    fn test_legacy_reader_gets_one_chunk_then_eof() {
        let tmp = tempfile::tempdir().unwrap();
        let (device, node) = load(tmp.path(), ReadContract::LegacyZero);
        let stop = AtomicBool::new(false);

        let (first, second) = std::thread::scope(|s| {
            let reader = s.spawn(|| {
                let mut f = std::fs::File::open(&node).unwrap();
                let mut buf = [0u8; 64];
                let first = f.read(&mut buf).unwrap();
                let second = f.read(&mut buf).unwrap();
                (first, second)
            });

            let fifo = std::fs::OpenOptions::new().write(true).open(&node).unwrap();
            serve_reader(&device, fifo, 4, &stop).unwrap();
            reader.join().unwrap()
        });

        assert_eq!(first, 4);
        assert_eq!(second, 0);
        let stats = device.stats();
        assert_eq!(stats.reads, 1);
        assert_eq!(stats.bytes_served, 4);
        assert_eq!(stats.active_sessions, 0);
    }

    #[test]
    fn test_byte_count_reader_keeps_streaming() {
        let tmp = tempfile::tempdir().unwrap();
        let (device, node) = load(tmp.path(), ReadContract::ByteCount);
        let stop = AtomicBool::new(false);

        let received = std::thread::scope(|s| {
            let reader = s.spawn(|| {
                let mut f = std::fs::File::open(&node).unwrap();
                let mut buf = [0u8; 16];
                f.read_exact(&mut buf).unwrap();
                buf
            });

            let fifo = std::fs::OpenOptions::new().write(true).open(&node).unwrap();
            // Returns once the reader hangs up.
            serve_reader(&device, fifo, 4, &stop).unwrap();
            reader.join().unwrap()
        });

        assert_eq!(received.len(), 16);
        let stats = device.stats();
        assert!(stats.bytes_served >= 16);
        assert_eq!(stats.transfer_faults, 1);
        assert_eq!(stats.live_buffers, 0);
    }

    #[test]
    fn test_stop_flag_ends_session_without_reading() {
        let tmp = tempfile::tempdir().unwrap();
        let (device, _node) = load(tmp.path(), ReadContract::ByteCount);
        let stop = AtomicBool::new(true);

        serve_reader(&device, Vec::new(), 4, &stop).unwrap();
        let stats = device.stats();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.reads, 0);
    }

    #[test]
    fn test_unloaded_device_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let (mut device, _node) = load(tmp.path(), ReadContract::ByteCount);
        device.unload();
        let stop = AtomicBool::new(false);

        let err = serve_reader(&device, Vec::new(), 4, &stop).unwrap_err();
        assert!(matches!(err, DeviceError::NotRegistered));
    }
}
