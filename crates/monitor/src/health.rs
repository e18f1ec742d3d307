//! 헬스 체커 -- 디스크, 메모리, 서비스 생존 여부 점검
//!
//! [`SystemProbe`] trait 뒤에서 호스트 정보를 읽고, [`HealthChecker`]가 임계값과 비교합니다.
//! 프로브는 블로킹 스레드에서 타임아웃과 함께 실행되며,
//! 실패한 프로브는 이슈 대신 "unknown" 상태로 보고됩니다.

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use logsentry_core::config::HealthConfig;

use crate::error::ProbeError;

/// 사용률 측정값
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Usage {
    /// 사용 중인 양
    pub used: u64,
    /// 전체 양
    pub total: u64,
}

impl Usage {
    /// 사용률 (%). 전체가 0이면 0입니다.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.used as f64 / self.total as f64 * 100.0
    }

    /// 사용률이 임계값을 초과하는지 확인합니다 (같으면 초과 아님).
    pub fn exceeds(&self, threshold: u8) -> bool {
        self.percent() > f64::from(threshold)
    }
}

/// 호스트 정보 프로브
///
/// 모든 메서드는 블로킹 호출입니다. [`HealthChecker`]가 `spawn_blocking`으로 실행합니다.
pub trait SystemProbe: Send + Sync + 'static {
    /// 경로가 속한 파일시스템의 사용량
    fn disk_usage(&self, path: &Path) -> Result<Usage, ProbeError>;

    /// 메모리 사용량
    fn memory_usage(&self) -> Result<Usage, ProbeError>;

    /// 실행 중인 프로세스 이름 집합
    fn process_names(&self) -> Result<HashSet<String>, ProbeError>;
}

/// 실제 호스트를 읽는 프로브 (`statvfs`, `/proc`)
#[derive(Debug, Clone)]
pub struct HostProbe {
    proc_root: PathBuf,
}

impl Default for HostProbe {
    fn default() -> Self {
        Self {
            proc_root: PathBuf::from("/proc"),
        }
    }
}

impl HostProbe {
    /// `/proc`를 사용하는 프로브를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 다른 procfs 루트를 사용합니다.
    #[cfg(test)]
    pub(crate) fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
        }
    }
}

impl SystemProbe for HostProbe {
    #[cfg(unix)]
    fn disk_usage(&self, path: &Path) -> Result<Usage, ProbeError> {
        use std::os::unix::ffi::OsStrExt;

        let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
            .map_err(|e| ProbeError::Unavailable(format!("invalid path: {e}")))?;

        // SAFETY: statvfs는 c_path(NUL 종료)를 읽고 stat 구조체에만 씁니다.
        let mut stat: libc::statvfs = unsafe { std::mem::zeroed() };
        let ret = unsafe { libc::statvfs(c_path.as_ptr(), &mut stat) };
        if ret != 0 {
            return Err(std::io::Error::last_os_error().into());
        }

        #[allow(clippy::unnecessary_cast)]
        let (block_size, blocks, free, avail) = (
            stat.f_frsize as u64,
            stat.f_blocks as u64,
            stat.f_bfree as u64,
            stat.f_bavail as u64,
        );
        let used = blocks.saturating_sub(free) * block_size;
        // df와 같은 기준: 일반 사용자가 쓸 수 있는 공간 대비
        Ok(Usage {
            used,
            total: used + avail * block_size,
        })
    }

    #[cfg(not(unix))]
    fn disk_usage(&self, _path: &Path) -> Result<Usage, ProbeError> {
        Err(ProbeError::Unavailable(
            "disk usage is not supported on this platform".to_owned(),
        ))
    }

    fn memory_usage(&self) -> Result<Usage, ProbeError> {
        let content = std::fs::read_to_string(self.proc_root.join("meminfo"))?;
        parse_meminfo(&content)
    }

    fn process_names(&self) -> Result<HashSet<String>, ProbeError> {
        let mut names = HashSet::new();
        for entry in std::fs::read_dir(&self.proc_root)? {
            let Ok(entry) = entry else { continue };
            let is_pid = entry
                .file_name()
                .to_str()
                .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()));
            if !is_pid {
                continue;
            }
            // 읽는 도중 종료된 프로세스는 무시
            if let Ok(comm) = std::fs::read_to_string(entry.path().join("comm")) {
                names.insert(comm.trim_end().to_owned());
            }
            // comm은 15바이트로 잘리므로 argv[0]의 파일 이름도 함께 기록
            if let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) {
                if let Some(name) = argv0_name(&cmdline) {
                    names.insert(name);
                }
            }
        }
        Ok(names)
    }
}

/// 커널이 `comm`에 보관하는 최대 바이트 수 (`TASK_COMM_LEN - 1`)
const COMM_MAX_BYTES: usize = 15;

/// `/proc/<pid>/cmdline`의 첫 인자에서 파일 이름을 꺼냅니다.
fn argv0_name(cmdline: &[u8]) -> Option<String> {
    let argv0 = cmdline.split(|&b| b == 0).next()?;
    let argv0 = String::from_utf8_lossy(argv0);
    let name = argv0.rsplit('/').next()?.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

/// 설정된 서비스 이름이 실행 중인 프로세스 이름과 일치하는지 확인합니다.
///
/// 전체 이름이 없으면 `comm`처럼 15바이트로 잘린 이름으로도 비교합니다.
fn is_service_running(running: &HashSet<String>, service: &str) -> bool {
    if running.contains(service) {
        return true;
    }
    if service.len() <= COMM_MAX_BYTES {
        return false;
    }
    let mut cut = COMM_MAX_BYTES;
    while !service.is_char_boundary(cut) {
        cut -= 1;
    }
    running.contains(&service[..cut])
}

/// `/proc/meminfo` 내용에서 `MemTotal`/`MemAvailable` 기준 사용량을 계산합니다.
pub fn parse_meminfo(content: &str) -> Result<Usage, ProbeError> {
    let mut total = None;
    let mut available = None;

    for line in content.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let kb = value
            .split_whitespace()
            .next()
            .and_then(|v| v.parse::<u64>().ok());
        match key.trim() {
            "MemTotal" => total = kb,
            "MemAvailable" => available = kb,
            _ => {}
        }
    }

    match (total, available) {
        (Some(total), Some(available)) if total > 0 => Ok(Usage {
            used: total.saturating_sub(available) * 1024,
            total: total * 1024,
        }),
        _ => Err(ProbeError::Unavailable(
            "MemTotal/MemAvailable not found in meminfo".to_owned(),
        )),
    }
}

/// 헬스 이슈 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// 디스크 사용률 초과
    Disk,
    /// 메모리 사용률 초과
    Memory,
    /// 서비스 프로세스 없음
    Service,
}

/// 임계값 위반 한 건
#[derive(Debug, Clone, PartialEq)]
pub struct HealthIssue {
    /// 종류
    pub kind: IssueKind,
    /// 사람이 읽을 수 있는 설명
    pub message: String,
}

impl fmt::Display for HealthIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// 한 패스의 헬스 체크 결과
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HealthReport {
    /// 임계값 위반 목록 (한 메시지로 합쳐 전송)
    pub issues: Vec<HealthIssue>,
    /// 다이제스트에 표시할 상태 라인
    pub status: Vec<String>,
}

/// 헬스 체커
pub struct HealthChecker<P: SystemProbe> {
    probe: Arc<P>,
    config: HealthConfig,
    timeout: Duration,
}

impl<P: SystemProbe> HealthChecker<P> {
    /// 설정과 프로브로 체커를 생성합니다.
    pub fn new(config: HealthConfig, probe: P) -> Self {
        let timeout = Duration::from_secs(config.probe_timeout_secs);
        Self {
            probe: Arc::new(probe),
            config,
            timeout,
        }
    }

    /// 프로브 타임아웃을 변경합니다.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// 모든 점검을 실행합니다.
    ///
    /// 비활성화되어 있으면 이슈 없이 상태 라인 하나만 반환합니다.
    pub async fn check(&self) -> HealthReport {
        let mut report = HealthReport::default();
        if !self.config.enabled {
            report.status.push("health checks disabled".to_owned());
            return report;
        }

        let disk_path = PathBuf::from(&self.config.disk_path);
        let path_for_probe = disk_path.clone();
        match self
            .run_probe("disk", move |p| p.disk_usage(&path_for_probe))
            .await
        {
            Ok(usage) => {
                report
                    .status
                    .push(format!("disk {}: {:.1}%", disk_path.display(), usage.percent()));
                if usage.exceeds(self.config.disk_threshold) {
                    report.issues.push(HealthIssue {
                        kind: IssueKind::Disk,
                        message: format!(
                            "disk usage on {} at {:.1}% (threshold {}%)",
                            disk_path.display(),
                            usage.percent(),
                            self.config.disk_threshold
                        ),
                    });
                }
            }
            Err(_) => report.status.push(format!("disk {}: unknown", disk_path.display())),
        }

        match self.run_probe("memory", |p| p.memory_usage()).await {
            Ok(usage) => {
                report
                    .status
                    .push(format!("memory: {:.1}%", usage.percent()));
                if usage.exceeds(self.config.mem_threshold) {
                    report.issues.push(HealthIssue {
                        kind: IssueKind::Memory,
                        message: format!(
                            "memory usage at {:.1}% (threshold {}%)",
                            usage.percent(),
                            self.config.mem_threshold
                        ),
                    });
                }
            }
            Err(_) => report.status.push("memory: unknown".to_owned()),
        }

        if !self.config.services.is_empty() {
            match self.run_probe("services", |p| p.process_names()).await {
                Ok(running) => {
                    for service in &self.config.services {
                        if is_service_running(&running, service) {
                            report.status.push(format!("service {service}: up"));
                        } else {
                            report.status.push(format!("service {service}: down"));
                            report.issues.push(HealthIssue {
                                kind: IssueKind::Service,
                                message: format!("service {service} is not running"),
                            });
                        }
                    }
                }
                Err(_) => {
                    for service in &self.config.services {
                        report.status.push(format!("service {service}: unknown"));
                    }
                }
            }
        }

        tracing::info!(
            issues = report.issues.len(),
            checks = report.status.len(),
            "health check completed"
        );
        report
    }

    async fn run_probe<T, F>(&self, name: &'static str, f: F) -> Result<T, ProbeError>
    where
        T: Send + 'static,
        F: FnOnce(&P) -> Result<T, ProbeError> + Send + 'static,
    {
        let probe = Arc::clone(&self.probe);
        let result =
            match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(move || f(&probe)))
                .await
            {
                Ok(Ok(result)) => result,
                Ok(Err(join_err)) => Err(ProbeError::Unavailable(format!(
                    "probe task failed: {join_err}"
                ))),
                Err(_) => Err(ProbeError::Timeout(self.timeout)),
            };

        if let Err(e) = &result {
            tracing::warn!(probe = name, error = %e, "health probe failed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 고정값을 반환하는 테스트 프로브
    #[derive(Default)]
    struct FixedProbe {
        disk: Option<Usage>,
        memory: Option<Usage>,
        processes: Option<Vec<&'static str>>,
        delay: Option<Duration>,
    }

    impl SystemProbe for FixedProbe {
        fn disk_usage(&self, _path: &Path) -> Result<Usage, ProbeError> {
            if let Some(delay) = self.delay {
                std::thread::sleep(delay);
            }
            self.disk
                .ok_or_else(|| ProbeError::Unavailable("no disk".to_owned()))
        }

        fn memory_usage(&self) -> Result<Usage, ProbeError> {
            self.memory
                .ok_or_else(|| ProbeError::Unavailable("no memory".to_owned()))
        }

        fn process_names(&self) -> Result<HashSet<String>, ProbeError> {
            self.processes
                .as_ref()
                .map(|p| p.iter().map(|s| (*s).to_owned()).collect())
                .ok_or_else(|| ProbeError::Unavailable("no proc".to_owned()))
        }
    }

    fn pct(used: u64) -> Usage {
        Usage { used, total: 100 }
    }

    fn config() -> HealthConfig {
        HealthConfig {
            services: vec!["sshd".to_owned()],
            ..HealthConfig::default()
        }
    }

    #[tokio::test]
    async fn disk_over_threshold_is_single_issue() {
        let probe = FixedProbe {
            disk: Some(pct(92)),
            memory: Some(pct(40)),
            processes: Some(vec!["sshd", "cron"]),
            ..FixedProbe::default()
        };
        let report = HealthChecker::new(config(), probe).check().await;

        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::Disk);
        assert!(report.issues[0].message.contains("92.0%"));
        assert!(report.status.contains(&"service sshd: up".to_owned()));
    }

    #[tokio::test]
    async fn usage_equal_to_threshold_is_not_issue() {
        let probe = FixedProbe {
            disk: Some(pct(90)),
            memory: Some(pct(95)),
            processes: Some(vec!["sshd"]),
            ..FixedProbe::default()
        };
        let report = HealthChecker::new(config(), probe).check().await;
        assert!(report.issues.is_empty());
    }

    #[tokio::test]
    async fn missing_service_is_issue() {
        let probe = FixedProbe {
            disk: Some(pct(10)),
            memory: Some(pct(10)),
            processes: Some(vec!["cron"]),
            ..FixedProbe::default()
        };
        let report = HealthChecker::new(config(), probe).check().await;
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].kind, IssueKind::Service);
    }

    #[tokio::test]
    async fn failed_probes_are_unknown_not_issues() {
        let report = HealthChecker::new(config(), FixedProbe::default())
            .check()
            .await;
        assert!(report.issues.is_empty());
        assert!(report.status.iter().all(|s| s.ends_with("unknown")));
        assert_eq!(report.status.len(), 3);
    }

    #[tokio::test]
    async fn slow_probe_times_out_as_unknown() {
        let probe = FixedProbe {
            disk: Some(pct(99)),
            memory: Some(pct(10)),
            delay: Some(Duration::from_millis(300)),
            ..FixedProbe::default()
        };
        let cfg = HealthConfig {
            services: Vec::new(),
            ..HealthConfig::default()
        };
        let report = HealthChecker::new(cfg, probe)
            .with_timeout(Duration::from_millis(50))
            .check()
            .await;
        assert!(report.issues.is_empty());
        assert!(report.status[0].ends_with("unknown"));
    }

    #[tokio::test]
    async fn disabled_checker_reports_nothing() {
        let cfg = HealthConfig {
            enabled: false,
            ..config()
        };
        let report = HealthChecker::new(cfg, FixedProbe::default()).check().await;
        assert!(report.issues.is_empty());
        assert_eq!(report.status, vec!["health checks disabled".to_owned()]);
    }

    #[test]
    fn parse_meminfo_uses_available() {
        let content = "MemTotal:       16000000 kB\nMemFree:         1000000 kB\nMemAvailable:    4000000 kB\n";
        let usage = parse_meminfo(content).unwrap();
        assert!((usage.percent() - 75.0).abs() < 0.01);
    }

    #[test]
    fn parse_meminfo_missing_fields_is_error() {
        assert!(parse_meminfo("MemTotal: 100 kB\n").is_err());
    }

    #[test]
    fn host_probe_reads_fake_procfs() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("1")).unwrap();
        std::fs::write(dir.path().join("1/comm"), "sshd\n").unwrap();
        std::fs::create_dir(dir.path().join("self")).unwrap();
        std::fs::write(
            dir.path().join("meminfo"),
            "MemTotal: 1000 kB\nMemAvailable: 500 kB\n",
        )
        .unwrap();

        let probe = HostProbe::with_proc_root(dir.path());
        let names = probe.process_names().unwrap();
        assert!(names.contains("sshd"));
        assert_eq!(names.len(), 1);
        assert!((probe.memory_usage().unwrap().percent() - 50.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn long_service_name_matches_truncated_comm() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("42")).unwrap();
        std::fs::write(dir.path().join("42/comm"), "payments-gatewa\n").unwrap();
        std::fs::write(
            dir.path().join("meminfo"),
            "MemTotal: 1000 kB\nMemAvailable: 500 kB\n",
        )
        .unwrap();

        let cfg = HealthConfig {
            services: vec![
                "payments-gateway-worker".to_owned(),
                "systemd-journald".to_owned(),
            ],
            ..HealthConfig::default()
        };
        let report = HealthChecker::new(cfg, HostProbe::with_proc_root(dir.path()))
            .check()
            .await;

        assert!(
            report
                .status
                .contains(&"service payments-gateway-worker: up".to_owned())
        );
        assert!(report.status.contains(&"service systemd-journald: down".to_owned()));
        assert_eq!(
            report
                .issues
                .iter()
                .filter(|i| i.kind == IssueKind::Service)
                .count(),
            1
        );
    }

    #[test]
    fn host_probe_records_argv0_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("7")).unwrap();
        std::fs::write(dir.path().join("7/comm"), "payments-gatewa\n").unwrap();
        std::fs::write(
            dir.path().join("7/cmdline"),
            b"/opt/pay/bin/payments-gateway-worker\0--port\08080\0",
        )
        .unwrap();

        let names = HostProbe::with_proc_root(dir.path()).process_names().unwrap();
        assert!(names.contains("payments-gatewa"));
        assert!(names.contains("payments-gateway-worker"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let running = HashSet::from(["서비스-워".to_owned()]);
        // 15바이트 경계가 한글 문자 중간에 걸림
        assert!(is_service_running(&running, "서비스-워커-프로세스"));
        assert!(!is_service_running(&running, "서비스"));
    }

    #[cfg(unix)]
    #[test]
    fn host_probe_disk_usage_for_root() {
        let usage = HostProbe::new().disk_usage(Path::new("/")).unwrap();
        assert!(usage.total > 0);
        assert!(usage.percent() <= 100.0);
    }
}
