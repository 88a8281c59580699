use pimon_core::{
    AgentKind, CollectionSupervisor, CommandExecutor, Config, Result, Series, Snapshot,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Fake Raspberry Pi: canned output per command, a broken routing table.
struct FakePi {
    calls: AtomicUsize,
}

impl CommandExecutor for FakePi {
    fn execute(&self, command: &str) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let out: &[&str] = match command {
            c if c.ends_with("measure_temp") => &["temp=50.0'C"],
            c if c.ends_with("measure_volts") => &["volt=1.2000V"],
            c if c.ends_with("measure_clock arm") => &["frequency(48)=1500398464"],
            c if c.ends_with("measure_clock core") => &["frequency(1)=500000000"],
            c if c.ends_with("get_throttled") => &["throttled=0x0"],
            c if c.ends_with("ps aux") => &[
                "USER PID %CPU %MEM VSZ RSS TTY STAT START TIME COMMAND",
                "pi 100 15.0 6.0 1 1 ? S 10:00 0:01 python3",
                "pi 101 5.0 4.0 1 1 ? S 10:00 0:01 sshd",
            ],
            c if c.ends_with("sar -n DEV 1 1") => &[
                "Average: IFACE rxpck/s txpck/s rxkB/s txkB/s",
                "Average: wlan0 40.00 33.00 12.30 45.60 0.00",
            ],
            c if c.ends_with("df --total") => &[
                "Filesystem 1K-blocks Used Available Use% Mounted on",
                "total 1000000 400000 600000 40% -",
            ],
            // `ip r` answers with something that is not a routing table
            _ => &["RTNETLINK answers: Operation not permitted"],
        };
        Ok(out.iter().map(|s| s.to_string()).collect())
    }

    fn target_name(&self) -> String {
        "10.0.0.42".to_string()
    }
}

fn wait_until(store_check: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(15);
    while !store_check() {
        assert!(Instant::now() < deadline, "collection made no progress");
        thread::sleep(Duration::from_millis(20));
    }
}

fn values(snapshot: &Snapshot, series: Series) -> Vec<String> {
    snapshot.series(series).iter().map(|s| s.value.clone()).collect()
}

#[test]
fn supervisor_collects_every_family_and_derives_power() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config {
        interval_ms: 100,
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    config.agent_intervals_ms.insert(AgentKind::DiskUsage, 200);

    let executor = Arc::new(FakePi {
        calls: AtomicUsize::new(0),
    });
    let supervisor = CollectionSupervisor::with_executor(config, executor.clone()).unwrap();
    let running = supervisor.start().unwrap();
    let store = running.store();

    wait_until(|| {
        let snapshot = store.read_all().unwrap();
        snapshot.series(Series::Power).len() >= 2 && snapshot.series(Series::AllSpace).len() >= 2
    });
    running.shutdown();
    let stats = running.wait().unwrap();
    assert_eq!(stats.len(), AgentKind::ALL.len());

    let snapshot = store.read_all().unwrap();
    assert_eq!(values(&snapshot, Series::Power)[0], "581.0");
    assert_eq!(values(&snapshot, Series::Temperature)[0], "50.0");
    assert_eq!(values(&snapshot, Series::CpuLoad)[0], "20");
    assert_eq!(values(&snapshot, Series::MemoryLoad)[0], "10");
    assert_eq!(values(&snapshot, Series::RxKb)[0], "12.30");
    assert_eq!(values(&snapshot, Series::TxKb)[0], "45.60");
    assert_eq!(values(&snapshot, Series::Throttle)[0], "0x0");
    assert_eq!(values(&snapshot, Series::FreqArm)[0], "1500398464");
    assert_eq!(values(&snapshot, Series::DiskSpaceUsage)[0], "40");

    // Malformed routing output skipped every cycle without killing the agent.
    assert!(snapshot.series(Series::GatewayIp).is_empty());
    let (_, identity) = stats
        .iter()
        .find(|(kind, _)| *kind == AgentKind::NetworkIdentity)
        .unwrap();
    assert!(identity.cycles >= 1);
    assert_eq!(identity.cycles, identity.skipped);

    // Every successful append is accounted for.
    let appended: u64 = stats.iter().map(|(_, s)| s.samples).sum();
    assert_eq!(snapshot.total_samples() as u64, appended);
    assert!(executor.calls.load(Ordering::Relaxed) > 0);
}

#[test]
fn store_file_is_keyed_by_target() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let supervisor = CollectionSupervisor::with_executor(
        config,
        Arc::new(FakePi {
            calls: AtomicUsize::new(0),
        }),
    )
    .unwrap();

    let expected = dir
        .path()
        .join(format!("{}.json", pimon_core::target_key("10.0.0.42")));
    assert_eq!(supervisor.store().path(), expected.as_path());
    assert_eq!(pimon_core::read_snapshot(&expected).unwrap(), Snapshot::empty());
}
