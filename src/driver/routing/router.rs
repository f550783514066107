//! 라우터
//!
//! 서버별 연결 풀과 데이터베이스별 라우팅 테이블을 소유합니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::bolt::AccessMode;

use super::super::driver::{DriverConfig, ServerAddress, ServerInfo};
use super::super::error::{DriverError, DriverResult};
use super::super::pool::{ConnectionPool, PoolMetrics, PooledConnection};
use super::policy::ServerSelector;
use super::table::RoutingTable;

/// 연결 획득 요청
#[derive(Debug, Clone, Copy)]
pub struct AcquireRequest<'a> {
    /// 데이터베이스 (None이면 서버 기본값)
    pub database: Option<&'a str>,
    /// 접근 모드
    pub mode: AccessMode,
    /// 라우팅 조회에 넘길 북마크
    pub bookmarks: &'a [String],
    /// 가장 사용자
    pub impersonated_user: Option<&'a str>,
}

impl<'a> AcquireRequest<'a> {
    /// 기본 데이터베이스, 북마크 없음
    pub fn new(mode: AccessMode) -> Self {
        Self {
            database: None,
            mode,
            bookmarks: &[],
            impersonated_user: None,
        }
    }
}

/// 라우터
///
/// 직접 연결(`bolt://`)이면 첫 번째 주소의 풀만 씁니다.
/// 라우팅(`neo4j://`)이면 테이블을 유지하며 역할에 맞는 서버를 고릅니다.
pub struct Router {
    /// 드라이버 설정
    config: Arc<DriverConfig>,
    /// 서버별 연결 풀
    pools: RwLock<HashMap<ServerAddress, Arc<ConnectionPool>>>,
    /// 데이터베이스별 라우팅 테이블 (기본 데이터베이스는 "")
    tables: RwLock<HashMap<String, RoutingTable>>,
    /// 테이블 갱신 직렬화
    refresh_lock: Mutex<()>,
    /// 서버 선택기
    selector: ServerSelector,
    /// 닫힘 여부
    closed: AtomicBool,
}

impl Router {
    /// 새 라우터 생성
    pub fn new(config: Arc<DriverConfig>) -> Self {
        Self {
            selector: ServerSelector::new(config.routing_policy),
            config,
            pools: RwLock::new(HashMap::new()),
            tables: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
        }
    }

    /// 요청에 맞는 서버에서 연결 획득
    ///
    /// 도달할 수 없는 서버는 모든 테이블에서 지우고 다른 서버를 시도합니다.
    pub async fn acquire(&self, request: AcquireRequest<'_>) -> DriverResult<PooledConnection> {
        self.ensure_open()?;

        if !self.config.routing {
            return self.pool(&self.direct_address()?).acquire().await;
        }

        let mut tried: Vec<ServerAddress> = Vec::new();
        let mut last_error = None;
        loop {
            let table = self.ensure_table(request).await?;
            let candidates: Vec<ServerAddress> = table
                .servers_for(request.mode)
                .iter()
                .filter(|a| !tried.contains(a))
                .cloned()
                .collect();

            let address = match self.selector.select(&candidates, |a| self.load(a)) {
                Some(address) => address,
                None => {
                    return Err(DriverError::service_unavailable(match last_error {
                        Some(e) => format!("No {} server reachable: {}", mode_name(request.mode), e),
                        None => format!("No {} server available", mode_name(request.mode)),
                    }))
                }
            };

            match self.pool(&address).acquire().await {
                Ok(connection) => return Ok(connection),
                Err(e) if is_unreachable(&e) => {
                    warn!(address = %address, error = %e, "Server unreachable, removing from routing tables");
                    self.forget(&address);
                    tried.push(address);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// 테이블이 요청 모드에 유효하면 그대로, 아니면 갱신
    async fn ensure_table(&self, request: AcquireRequest<'_>) -> DriverResult<RoutingTable> {
        let key = table_key(request.database);
        if let Some(table) = self.fresh_table(&key, request.mode) {
            return Ok(table);
        }

        let _guard = self.refresh_lock.lock().await;
        // 대기 중 다른 작업이 갱신했을 수 있음
        if let Some(table) = self.fresh_table(&key, request.mode) {
            return Ok(table);
        }

        self.refresh(request).await
    }

    fn fresh_table(&self, key: &str, mode: AccessMode) -> Option<RoutingTable> {
        self.tables
            .read()
            .get(key)
            .filter(|table| table.is_fresh_for(mode))
            .cloned()
    }

    /// 라우팅 테이블 갱신
    ///
    /// 알려진 라우터를 차례로 시도하고, 모두 실패하면 초기 주소를 시도합니다.
    pub async fn refresh(&self, request: AcquireRequest<'_>) -> DriverResult<RoutingTable> {
        let key = table_key(request.database);
        let mut candidates: Vec<ServerAddress> = self
            .tables
            .read()
            .get(&key)
            .map(|table| table.routers.clone())
            .unwrap_or_default();
        for seed in &self.config.addresses {
            if !candidates.contains(seed) {
                candidates.push(seed.clone());
            }
        }

        let mut last_error = None;
        for router in candidates {
            match self.fetch_table(&router, request).await {
                Ok(table) if table.routers.is_empty() => {
                    warn!(router = %router, "Routing table without routers ignored");
                }
                Ok(table) => {
                    debug!(
                        router = %router,
                        database = ?table.database,
                        routers = table.routers.len(),
                        writers = table.writers.len(),
                        readers = table.readers.len(),
                        ttl = ?table.ttl,
                        "Routing table refreshed"
                    );
                    self.tables.write().insert(key, table.clone());
                    if table.servers_for(request.mode).is_empty() {
                        return Err(DriverError::service_unavailable(format!(
                            "No {} server in routing table for {}",
                            mode_name(request.mode),
                            request.database.unwrap_or("default database")
                        )));
                    }
                    return Ok(table);
                }
                // 인증 실패, 존재하지 않는 데이터베이스 등은 다른 라우터도 같은 답을 줌
                Err(e @ DriverError::Client { .. }) => return Err(e),
                Err(e) => {
                    warn!(router = %router, error = %e, "Routing table fetch failed");
                    if is_unreachable(&e) {
                        self.forget(&router);
                    }
                    last_error = Some(e);
                }
            }
        }

        Err(DriverError::service_unavailable(match last_error {
            Some(e) => format!("Unable to fetch routing table from any router: {}", e),
            None => "Unable to fetch routing table: no router known".to_string(),
        }))
    }

    async fn fetch_table(&self, router: &ServerAddress, request: AcquireRequest<'_>) -> DriverResult<RoutingTable> {
        let mut connection = self.pool(router).acquire().await?;
        let info = connection
            .route(
                self.config.routing_context_for(router),
                request.bookmarks.to_vec(),
                request.database.map(String::from),
                request.impersonated_user.map(String::from),
            )
            .await?;
        RoutingTable::from_info(request.database, &info)
    }

    /// 리더가 아니라고 응답한 서버를 라이터에서 제거
    pub fn on_not_a_leader(&self, database: Option<&str>, address: &ServerAddress) {
        if let Some(table) = self.tables.write().get_mut(&table_key(database)) {
            table.forget_writer(address);
        }
        debug!(address = %address, database = ?database, "Writer removed after leader switch");
    }

    /// 도달할 수 없는 서버를 모든 테이블에서 제거하고 유휴 연결을 버림
    pub fn forget(&self, address: &ServerAddress) {
        for table in self.tables.write().values_mut() {
            table.forget(address);
        }
        if let Some(pool) = self.pools.read().get(address) {
            pool.purge_idle();
        }
    }

    /// 캐시된 라우팅 테이블
    pub fn routing_table(&self, database: Option<&str>) -> Option<RoutingTable> {
        self.tables.read().get(&table_key(database)).cloned()
    }

    /// 모든 풀의 메트릭 (주소순)
    pub fn pool_metrics(&self) -> Vec<PoolMetrics> {
        let mut metrics: Vec<PoolMetrics> = self.pools.read().values().map(|p| p.metrics()).collect();
        metrics.sort_by_key(|m| m.address.to_string());
        metrics
    }

    /// 연결 확인
    ///
    /// 라우팅 모드에서는 라우팅 테이블을 받은 뒤 리더 하나에 연결합니다.
    pub async fn verify_connectivity(&self) -> DriverResult<ServerInfo> {
        let connection = self.acquire(AcquireRequest::new(AccessMode::Read)).await?;
        Ok(ServerInfo {
            address: connection.address().clone(),
            agent: connection.server_agent().unwrap_or_default().to_string(),
            protocol_version: connection.version().to_string(),
        })
    }

    /// 모든 풀 닫기
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let pools: Vec<Arc<ConnectionPool>> = self.pools.read().values().cloned().collect();
        for pool in pools {
            pool.close().await;
        }
        self.tables.write().clear();
    }

    /// 주소의 풀 가져오기 또는 생성
    fn pool(&self, address: &ServerAddress) -> Arc<ConnectionPool> {
        if let Some(pool) = self.pools.read().get(address) {
            return pool.clone();
        }

        self.pools
            .write()
            .entry(address.clone())
            .or_insert_with(|| Arc::new(ConnectionPool::new(address.clone(), self.config.clone())))
            .clone()
    }

    fn load(&self, address: &ServerAddress) -> usize {
        self.pools
            .read()
            .get(address)
            .map_or(0, |pool| pool.in_use_count())
    }

    fn direct_address(&self) -> DriverResult<ServerAddress> {
        self.config
            .addresses
            .first()
            .cloned()
            .ok_or_else(|| DriverError::configuration("No server address configured"))
    }

    fn ensure_open(&self) -> DriverResult<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(DriverError::session("Driver is closed"))
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for Router {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Router")
            .field("routing", &self.config.routing)
            .field("pools", &self.pools.read().len())
            .field("tables", &self.tables.read().len())
            .field("policy", &self.selector.policy())
            .finish()
    }
}

fn table_key(database: Option<&str>) -> String {
    database.unwrap_or_default().to_string()
}

fn mode_name(mode: AccessMode) -> &'static str {
    match mode {
        AccessMode::Write => "writer",
        AccessMode::Read => "reader",
    }
}

/// 연결 자체를 맺지 못한 경우
fn is_unreachable(error: &DriverError) -> bool {
    matches!(error, DriverError::Connection(_) | DriverError::Timeout(_))
}
