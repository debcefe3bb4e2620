use std::sync::Arc;

use serde::Serialize;

use rngdev_core::{
    DeviceStats, HeapAllocator, Inventory, OsRandom, RandomByteSource, RandomDevice,
    RegistrationStage, SeededSource, SimulatedHost,
};

pub struct ProbeOptions<'a> {
    pub bytes: usize,
    pub reads: usize,
    pub seed: Option<u64>,
    pub legacy_zero: bool,
    pub fail_at: Option<&'a str>,
    pub max_read_len: Option<usize>,
    pub json: bool,
}

#[derive(Serialize)]
struct ReadOutcome {
    index: usize,
    requested: usize,
    /// Count reported by the device, or the negative status code.
    status: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    hex: String,
}

#[derive(Serialize)]
struct ProbeReport {
    loaded: bool,
    /// Packed device number, as `stat` would show it in `st_rdev`.
    #[serde(skip_serializing_if = "Option::is_none")]
    devt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    load_error: Option<String>,
    reads: Vec<ReadOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<DeviceStats>,
    /// What the host still holds after unload (should be empty).
    residual: Inventory,
}

pub fn run(opts: ProbeOptions<'_>) {
    let report = probe(&opts);

    if opts.json {
        match serde_json::to_string_pretty(&report) {
            Ok(s) => println!("{s}"),
            Err(e) => eprintln!("Error serializing report: {e}"),
        }
    } else {
        print_report(&report);
    }

    if !report.loaded || !report.residual.is_empty() {
        std::process::exit(1);
    }
}

fn probe(opts: &ProbeOptions<'_>) -> ProbeReport {
    let mut config = super::load_config(None, opts.legacy_zero);
    if let Some(max) = opts.max_read_len {
        config.max_read_len = max;
    }

    let host = SimulatedHost::new();
    if let Some(stage) = opts.fail_at {
        match stage.parse::<RegistrationStage>() {
            Ok(stage) => host.fail_next(stage),
            Err(e) => log::warn!("ignoring --fail-at: {e}"),
        }
    }

    let source: Arc<dyn RandomByteSource> = match opts.seed {
        Some(seed) => Arc::new(SeededSource::new(seed)),
        None => Arc::new(OsRandom),
    };
    let allocator = Arc::new(HeapAllocator::with_limit(config.max_read_len));

    let mut device = match RandomDevice::with_parts(host.clone(), &config, source, allocator) {
        Ok(d) => d,
        Err(e) => {
            return ProbeReport {
                loaded: false,
                devt: None,
                load_error: Some(e.to_string()),
                reads: Vec::new(),
                stats: None,
                residual: host.inventory(),
            };
        }
    };

    let devt = device.identity().map(|id| id.number().encode());

    let mut reads = Vec::with_capacity(opts.reads);
    match device.open() {
        Ok(session) => {
            for index in 0..opts.reads {
                let mut buf = vec![0u8; opts.bytes];
                let outcome = match session.read(opts.bytes, &mut buf[..]) {
                    Ok(n) => ReadOutcome {
                        index,
                        requested: opts.bytes,
                        status: n as i64,
                        error: None,
                        hex: super::hex(&buf),
                    },
                    Err(e) => ReadOutcome {
                        index,
                        requested: opts.bytes,
                        status: i64::from(e.errno()),
                        error: Some(e.to_string()),
                        hex: String::new(),
                    },
                };
                reads.push(outcome);
            }
            session.close();
        }
        Err(e) => log::error!("open failed: {e}"),
    }

    let stats = device.stats();
    device.unload();

    ProbeReport {
        loaded: true,
        devt,
        load_error: None,
        reads,
        stats: Some(stats),
        residual: host.inventory(),
    }
}

fn print_report(report: &ProbeReport) {
    if let Some(err) = &report.load_error {
        println!("Load failed: {err}");
    }
    if let Some(stats) = &report.stats {
        if let Some(dev) = stats.device {
            println!(
                "Device {dev} [devt {:#010x}] (source={}, read_contract={})",
                report.devt.unwrap_or_default(),
                stats.source,
                stats.read_contract
            );
        }
    }
    for r in &report.reads {
        match &r.error {
            None => println!("read #{} ({}B) -> {}  {}", r.index, r.requested, r.status, r.hex),
            Some(e) => println!("read #{} ({}B) -> {}  {e}", r.index, r.requested, r.status),
        }
    }
    if let Some(stats) = &report.stats {
        println!(
            "opens={} reads={} bytes_served={} allocation_failures={} transfer_faults={} live_buffers={}",
            stats.opens,
            stats.reads,
            stats.bytes_served,
            stats.allocation_failures,
            stats.transfer_faults,
            stats.live_buffers
        );
    }
    if report.residual.is_empty() {
        println!("Host inventory after unload: empty");
    } else {
        println!("Host inventory after unload: {:?}", report.residual);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> ProbeOptions<'static> {
        ProbeOptions {
            bytes: 4,
            reads: 2,
            seed: Some(1),
            legacy_zero: false,
            fail_at: None,
            max_read_len: None,
            json: false,
        }
    }

    #[test]
    fn test_probe_reads_and_cleans_up() {
        let report = probe(&opts());
        assert!(report.loaded);
        assert_eq!(report.reads.len(), 2);
        assert!(report.reads.iter().all(|r| r.status == 4 && r.hex.len() == 8));
        assert!(report.residual.is_empty());
        let stats = report.stats.unwrap();
        assert_eq!(stats.opens, 1);
        assert_eq!(stats.bytes_served, 8);
    }

    #[test]
    fn test_probe_seed_is_reproducible() {
        let a = probe(&opts());
        let b = probe(&opts());
        assert_eq!(a.reads[0].hex, b.reads[0].hex);
        assert_ne!(a.reads[0].hex, a.reads[1].hex);
    }

    #[test]
    fn test_probe_legacy_zero() {
        let report = probe(&ProbeOptions {
            legacy_zero: true,
            ..opts()
        });
        assert!(report.reads.iter().all(|r| r.status == 0 && r.hex.len() == 8));
    }

    #[test]
    fn test_probe_fail_at_rolls_back() {
        for stage in ["major", "class", "node"] {
            let report = probe(&ProbeOptions {
                fail_at: Some(stage),
                ..opts()
            });
            assert!(!report.loaded);
            assert!(report.load_error.is_some());
            assert!(report.devt.is_none());
            assert!(report.residual.is_empty(), "residue after {stage}");
        }
    }

    #[test]
    fn test_probe_allocation_limit() {
        let report = probe(&ProbeOptions {
            bytes: 32,
            reads: 1,
            max_read_len: Some(16),
            ..opts()
        });
        assert_eq!(report.reads[0].status, i64::from(-libc::ENOMEM));
        assert!(report.reads[0].error.is_some());
    }

    #[test]
    fn test_probe_report_serializes() {
        let report = probe(&opts());
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["loaded"], true);
        assert_eq!(json["stats"]["read_contract"], "byte_count");
        // First dynamic major, minor 0.
        assert_eq!(json["devt"], 254u32 << 20);
        assert!(json.get("load_error").is_none());
    }
}
