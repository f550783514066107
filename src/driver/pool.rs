//! Connection Pool
//!
//! 서버 주소별 연결 풀링

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use super::bolt::BoltClient;
use super::driver::{DriverConfig, ServerAddress};
use super::error::{DriverError, DriverResult};

// ============================================================================
// PoolConfig - 풀 설정
// ============================================================================

/// 연결 풀 설정
///
/// | 필드 | 기본값 | 설명 |
/// |------|--------|------|
/// | `max_size` | 100 | 주소당 최대 사용 중 연결 수 |
/// | `max_lifetime` | 1시간 | 연결 최대 수명 |
/// | `idle_timeout` | 없음 | 유휴 타임아웃 |
/// | `acquisition_timeout` | 60초 | 획득 대기 시간 |
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// 최대 연결 수
    pub max_size: usize,
    /// 연결 최대 수명
    pub max_lifetime: Duration,
    /// 유휴 타임아웃 (None이면 비활성)
    pub idle_timeout: Option<Duration>,
    /// 획득 대기 시간
    pub acquisition_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_size: 100,
            max_lifetime: Duration::from_secs(3600),
            idle_timeout: None,
            acquisition_timeout: Duration::from_secs(60),
        }
    }
}

impl PoolConfig {
    /// 드라이버 설정에서 생성
    pub fn from_driver_config(config: &DriverConfig) -> Self {
        Self {
            max_size: config.max_pool_size,
            max_lifetime: config.max_connection_lifetime,
            idle_timeout: config.idle_timeout,
            acquisition_timeout: config.connection_acquisition_timeout,
        }
    }
}

// ============================================================================
// PoolMetrics - 풀 메트릭
// ============================================================================

/// 풀 메트릭
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolMetrics {
    /// 서버 주소
    pub address: ServerAddress,
    /// 유휴 연결 수
    pub idle: usize,
    /// 사용 중인 연결 수
    pub in_use: usize,
    /// 총 생성 횟수
    pub total_created: u64,
    /// 총 획득 횟수
    pub total_acquired: u64,
    /// 총 폐기 횟수
    pub total_discarded: u64,
    /// 획득 타임아웃 횟수
    pub acquisition_timeouts: u64,
}

// ============================================================================
// ConnectionPool - 연결 풀
// ============================================================================

/// 연결 풀
///
/// 사용 중인 연결마다 세마포어 허가 하나를 잡고 있으므로
/// 사용 중 연결 수는 `max_size`를 넘지 않습니다.
pub struct ConnectionPool {
    /// 서버 주소
    address: ServerAddress,
    /// 풀 설정
    config: PoolConfig,
    /// 연결 생성에 쓰는 드라이버 설정
    driver_config: Arc<DriverConfig>,
    /// 유휴 연결들 (LIFO)
    idle: Mutex<VecDeque<BoltClient>>,
    /// 사용 중 연결 허가
    permits: Arc<Semaphore>,
    /// 사용 중인 연결 수
    in_use: AtomicUsize,
    /// 총 생성 횟수
    total_created: AtomicU64,
    /// 총 획득 횟수
    total_acquired: AtomicU64,
    /// 총 폐기 횟수
    total_discarded: AtomicU64,
    /// 획득 타임아웃 횟수
    acquisition_timeouts: AtomicU64,
    /// 닫힘 여부
    closed: AtomicBool,
}

impl ConnectionPool {
    /// 새 연결 풀 생성
    pub fn new(address: ServerAddress, driver_config: Arc<DriverConfig>) -> Self {
        let config = PoolConfig::from_driver_config(&driver_config);
        Self {
            address,
            permits: Arc::new(Semaphore::new(config.max_size)),
            config,
            driver_config,
            idle: Mutex::new(VecDeque::new()),
            in_use: AtomicUsize::new(0),
            total_created: AtomicU64::new(0),
            total_acquired: AtomicU64::new(0),
            total_discarded: AtomicU64::new(0),
            acquisition_timeouts: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// 설정된 획득 대기 시간으로 연결 획득
    pub async fn acquire(self: &Arc<Self>) -> DriverResult<PooledConnection> {
        self.acquire_timeout(self.config.acquisition_timeout).await
    }

    /// 연결 획득
    ///
    /// 허가를 `wait` 안에 얻지 못하면 `PoolExhausted`를 반환합니다.
    pub async fn acquire_timeout(self: &Arc<Self>, wait: Duration) -> DriverResult<PooledConnection> {
        self.ensure_open()?;

        let permit = match tokio::time::timeout(wait, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(DriverError::session("Connection pool is closed")),
            Err(_) => {
                self.acquisition_timeouts.fetch_add(1, Ordering::Relaxed);
                return Err(DriverError::pool_exhausted(format!(
                    "No connection to {} available within {:?} (max_pool_size = {})",
                    self.address, wait, self.config.max_size
                )));
            }
        };

        let mut client = match self.take_idle().await {
            Some(client) => client,
            None => {
                let client = BoltClient::connect(&self.address, &self.driver_config).await?;
                self.total_created.fetch_add(1, Ordering::Relaxed);
                debug!(address = %self.address, id = client.connection().id(), "Connection created");
                client
            }
        };

        client.connection_mut().mark_in_use();
        self.in_use.fetch_add(1, Ordering::Relaxed);
        self.total_acquired.fetch_add(1, Ordering::Relaxed);
        debug!(address = %self.address, id = client.connection().id(), "Connection acquired");

        Ok(PooledConnection {
            client: Some(client),
            pool: self.clone(),
            _permit: permit,
        })
    }

    /// 재사용 가능한 유휴 연결 꺼내기
    ///
    /// 만료된 연결은 버리고, 스트림이나 트랜잭션이 남은 연결은 RESET 후 넘깁니다.
    async fn take_idle(&self) -> Option<BoltClient> {
        loop {
            let mut client = self.idle.lock().pop_back()?;

            if !client.is_open() || self.is_expired(&client) {
                self.discard(client, "expired").await;
                continue;
            }

            if client.needs_reset() || client.connection().pending_count() > 0 {
                if client.reset().await.is_err() {
                    self.discard(client, "reset failed").await;
                    continue;
                }
            }

            return Some(client);
        }
    }

    /// 수명 또는 유휴 시간 초과 여부
    fn is_expired(&self, client: &BoltClient) -> bool {
        let connection = client.connection();
        if connection.age() > self.config.max_lifetime {
            return true;
        }
        self.config
            .idle_timeout
            .map_or(false, |timeout| connection.idle_time() > timeout)
    }

    async fn discard(&self, mut client: BoltClient, reason: &str) {
        self.total_discarded.fetch_add(1, Ordering::Relaxed);
        debug!(address = %self.address, id = client.connection().id(), reason, "Connection discarded");
        if client.is_open() {
            client.goodbye().await;
        }
    }

    /// 연결 반환
    ///
    /// 건강하지 않거나 만료된 연결, 닫힌 풀로 돌아온 연결은 버립니다.
    pub fn release(&self, mut client: BoltClient, healthy: bool) {
        self.in_use.fetch_sub(1, Ordering::Relaxed);

        let reusable = healthy
            && client.is_open()
            && !self.closed.load(Ordering::Acquire)
            && !self.is_expired(&client);

        if reusable {
            client.connection_mut().mark_ready();
            self.idle.lock().push_back(client);
        } else {
            self.total_discarded.fetch_add(1, Ordering::Relaxed);
            debug!(
                address = %self.address,
                id = client.connection().id(),
                state = ?client.state(),
                "Connection discarded on release"
            );
        }
    }

    /// 유휴 연결 모두 버리기 (서버에 도달할 수 없을 때)
    pub fn purge_idle(&self) {
        let purged = self.idle.lock().drain(..).count();
        if purged > 0 {
            self.total_discarded.fetch_add(purged as u64, Ordering::Relaxed);
            debug!(address = %self.address, purged, "Idle connections purged");
        }
    }

    /// 풀 닫기
    ///
    /// 유휴 연결에는 GOODBYE를 보내고, 사용 중인 연결은 반환될 때 버립니다.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.permits.close();

        let drained: Vec<BoltClient> = self.idle.lock().drain(..).collect();
        for mut client in drained {
            client.goodbye().await;
        }
        debug!(address = %self.address, "Connection pool closed");
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::session("Connection pool is closed"))
        } else {
            Ok(())
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> PoolMetrics {
        PoolMetrics {
            address: self.address.clone(),
            idle: self.idle_count(),
            in_use: self.in_use_count(),
            total_created: self.total_created.load(Ordering::Relaxed),
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            total_discarded: self.total_discarded.load(Ordering::Relaxed),
            acquisition_timeouts: self.acquisition_timeouts.load(Ordering::Relaxed),
        }
    }

    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// 유휴 연결 수
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    /// 사용 중인 연결 수
    pub fn in_use_count(&self) -> usize {
        self.in_use.load(Ordering::Relaxed)
    }

    /// 닫힘 여부
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("address", &self.address)
            .field("max_size", &self.config.max_size)
            .field("idle", &self.idle_count())
            .field("in_use", &self.in_use_count())
            .finish()
    }
}

// ============================================================================
// PooledConnection - 풀링된 연결
// ============================================================================

/// 풀에서 빌린 연결
///
/// 드롭하면 풀로 돌아갑니다. 연결이 Ready/InUse가 아니면 버려집니다.
pub struct PooledConnection {
    client: Option<BoltClient>,
    pool: Arc<ConnectionPool>,
    _permit: OwnedSemaphorePermit,
}

impl PooledConnection {
    /// 서버 주소
    pub fn address(&self) -> &ServerAddress {
        self.pool.address()
    }

    /// 재사용하지 않고 버리기
    pub fn discard_connection(mut self) {
        if let Some(mut client) = self.client.take() {
            client.mark_defunct();
            self.pool.release(client, false);
        }
    }
}

impl Deref for PooledConnection {
    type Target = BoltClient;

    fn deref(&self) -> &BoltClient {
        self.client.as_ref().expect("pooled connection used after release")
    }
}

impl DerefMut for PooledConnection {
    fn deref_mut(&mut self) -> &mut BoltClient {
        self.client.as_mut().expect("pooled connection used after release")
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let healthy = client.is_open();
            self.pool.release(client, healthy);
        }
    }
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("address", self.address())
            .field("client", &self.client)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
