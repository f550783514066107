//! Driver
//!
//! 드라이버 인스턴스, 설정, 서버 주소

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tracing::debug;

use super::error::{DriverError, DriverResult};
use super::pool::PoolMetrics;
use super::routing::{Router, RoutingPolicy, RoutingTable};
use super::session::{Session, SessionConfig};
use crate::bolt::{AuthToken, PackStreamValue};

/// 기본 Bolt 포트
pub const DEFAULT_PORT: u16 = 7687;

// ============================================================================
// TrustStrategy - TLS 신뢰 전략
// ============================================================================

/// TLS 신뢰 전략
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TrustStrategy {
    /// 시스템(webpki) 루트 인증서
    #[default]
    SystemCas,
    /// 모든 인증서 신뢰 (`+ssc`, 개발용)
    TrustAll,
    /// 주어진 DER 인증서만 신뢰
    CustomCas(Vec<Vec<u8>>),
}

/// PULL 크기 검증 (양수 또는 -1)
pub(crate) fn validate_fetch_size(fetch_size: i64) -> DriverResult<()> {
    if fetch_size == 0 || fetch_size < -1 {
        return Err(DriverError::configuration(
            "fetch_size must be positive, or -1 to pull everything",
        ));
    }
    Ok(())
}

// ============================================================================
// ServerAddress - 서버 주소
// ============================================================================

/// 서버 주소
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServerAddress {
    /// 호스트
    pub host: String,
    /// 포트
    pub port: u16,
}

impl ServerAddress {
    /// 새 서버 주소 생성
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// `host`, `host:port`, `[v6]:port` 형식 파싱 (포트 생략 시 7687)
    pub fn parse(address: &str) -> DriverResult<Self> {
        let address = address.trim();
        if address.is_empty() {
            return Err(DriverError::configuration("Empty server address"));
        }

        if let Some(rest) = address.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(|| {
                DriverError::configuration(format!("Unterminated IPv6 address: {}", address))
            })?;
            let port = match tail.strip_prefix(':') {
                Some(port) => parse_port(port, address)?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => {
                    return Err(DriverError::configuration(format!(
                        "Invalid server address: {}",
                        address
                    )))
                }
            };
            return Ok(Self::new(host, port));
        }

        match address.rsplit_once(':') {
            Some((host, _)) if host.contains(':') => Err(DriverError::configuration(format!(
                "IPv6 addresses must be bracketed: {}",
                address
            ))),
            Some((host, port)) if !host.is_empty() => Ok(Self::new(host, parse_port(port, address)?)),
            Some(_) => Err(DriverError::configuration(format!(
                "Missing host in address: {}",
                address
            ))),
            None => Ok(Self::new(address, DEFAULT_PORT)),
        }
    }

    /// 소켓 주소 문자열
    pub fn to_socket_addr(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

fn parse_port(port: &str, address: &str) -> DriverResult<u16> {
    port.parse()
        .map_err(|_| DriverError::configuration(format!("Invalid port in address: {}", address)))
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_socket_addr())
    }
}

impl Default for ServerAddress {
    fn default() -> Self {
        Self::new("localhost", DEFAULT_PORT)
    }
}

// ============================================================================
// URI 파싱
// ============================================================================

/// 파싱된 연결 URI
#[derive(Debug, Clone, PartialEq)]
struct ParsedUri {
    routing: bool,
    encrypted: bool,
    trust_strategy: TrustStrategy,
    addresses: Vec<ServerAddress>,
    routing_context: HashMap<String, String>,
}

fn parse_uri(uri: &str) -> DriverResult<ParsedUri> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| DriverError::configuration(format!("URI without scheme: {}", uri)))?;

    let (routing, encrypted, trust_strategy) = match scheme.to_ascii_lowercase().as_str() {
        "bolt" => (false, false, TrustStrategy::SystemCas),
        "bolt+s" => (false, true, TrustStrategy::SystemCas),
        "bolt+ssc" => (false, true, TrustStrategy::TrustAll),
        "neo4j" => (true, false, TrustStrategy::SystemCas),
        "neo4j+s" => (true, true, TrustStrategy::SystemCas),
        "neo4j+ssc" => (true, true, TrustStrategy::TrustAll),
        other => {
            return Err(DriverError::configuration(format!(
                "Unsupported URI scheme: {}",
                other
            )))
        }
    };

    let (authority, query) = match rest.split_once('?') {
        Some((authority, query)) => (authority, Some(query)),
        None => (rest, None),
    };
    let authority = authority.trim_end_matches('/');

    let addresses = authority
        .split(',')
        .map(ServerAddress::parse)
        .collect::<DriverResult<Vec<_>>>()?;

    if !routing && addresses.len() > 1 {
        return Err(DriverError::configuration(format!(
            "Direct scheme {} accepts a single host",
            scheme
        )));
    }

    let mut routing_context = HashMap::new();
    if let Some(query) = query.filter(|q| !q.is_empty()) {
        if !routing {
            return Err(DriverError::configuration(format!(
                "Routing context is not supported by the {} scheme",
                scheme
            )));
        }
        for pair in query.split('&') {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                DriverError::configuration(format!("Invalid routing context entry: {}", pair))
            })?;
            if key.is_empty() || routing_context.insert(key.to_string(), value.to_string()).is_some() {
                return Err(DriverError::configuration(format!(
                    "Invalid or duplicate routing context key: {}",
                    key
                )));
            }
        }
    }

    Ok(ParsedUri {
        routing,
        encrypted,
        trust_strategy,
        addresses,
        routing_context,
    })
}

// ============================================================================
// DriverConfig - 드라이버 설정
// ============================================================================

/// 드라이버 설정
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// 초기 서버 주소 (라우팅 모드에서는 시드 라우터)
    pub addresses: Vec<ServerAddress>,
    /// 라우팅 모드 (`neo4j://`)
    pub routing: bool,
    /// URI에서 온 라우팅 컨텍스트
    pub routing_context: HashMap<String, String>,
    /// 인증 토큰
    pub auth: AuthToken,
    /// TLS 암호화
    pub encrypted: bool,
    /// TLS 신뢰 전략
    pub trust_strategy: TrustStrategy,
    /// 주소별 연결 풀 최대 크기
    pub max_pool_size: usize,
    /// TCP 연결 + 핸드셰이크 타임아웃
    pub connection_timeout: Duration,
    /// 풀에서 연결을 기다리는 최대 시간
    pub connection_acquisition_timeout: Duration,
    /// 연결 최대 수명
    pub max_connection_lifetime: Duration,
    /// 유휴 연결 타임아웃 (None이면 비활성)
    pub idle_timeout: Option<Duration>,
    /// 응답 하나를 기다리는 최대 시간 (None이면 무제한)
    pub read_timeout: Option<Duration>,
    /// 트랜잭션 함수 최대 재시도 횟수
    pub max_retry_count: usize,
    /// 첫 재시도 지연
    pub initial_retry_delay: Duration,
    /// 재시도 지연 배수
    pub retry_backoff_multiplier: f64,
    /// 재시도 지연 지터 비율 (0.0 ~ 1.0)
    pub retry_jitter_factor: f64,
    /// User Agent
    pub user_agent: String,
    /// PULL 배치 크기 (-1이면 전체)
    pub fetch_size: i64,
    /// 라우팅 서버 선택 정책
    pub routing_policy: RoutingPolicy,
}

impl DriverConfig {
    /// URI로 기본 설정 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let parsed = parse_uri(uri)?;
        Ok(Self {
            addresses: parsed.addresses,
            routing: parsed.routing,
            routing_context: parsed.routing_context,
            auth,
            encrypted: parsed.encrypted,
            trust_strategy: parsed.trust_strategy,
            max_pool_size: 100,
            connection_timeout: Duration::from_secs(30),
            connection_acquisition_timeout: Duration::from_secs(60),
            max_connection_lifetime: Duration::from_secs(3600),
            idle_timeout: None,
            read_timeout: None,
            max_retry_count: 5,
            initial_retry_delay: Duration::from_secs(1),
            retry_backoff_multiplier: 2.0,
            retry_jitter_factor: 0.2,
            user_agent: format!("graphwire/{}", env!("CARGO_PKG_VERSION")),
            fetch_size: -1,
            routing_policy: RoutingPolicy::default(),
        })
    }

    /// 빌더 시작
    pub fn builder(uri: &str, auth: AuthToken) -> DriverResult<DriverConfigBuilder> {
        let config = Self::new(uri, auth)?;
        Ok(DriverConfigBuilder { config })
    }

    /// 값 범위 검증
    pub fn validate(&self) -> DriverResult<()> {
        if self.addresses.is_empty() {
            return Err(DriverError::configuration("At least one server address is required"));
        }
        if self.max_pool_size == 0 {
            return Err(DriverError::configuration("max_pool_size must be at least 1"));
        }
        if !(self.retry_backoff_multiplier >= 1.0) {
            return Err(DriverError::configuration(
                "retry_backoff_multiplier must be at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.retry_jitter_factor) {
            return Err(DriverError::configuration(
                "retry_jitter_factor must be between 0.0 and 1.0",
            ));
        }
        validate_fetch_size(self.fetch_size)
    }

    /// HELLO / ROUTE에 보낼 라우팅 컨텍스트
    pub(crate) fn routing_context_for(&self, address: &ServerAddress) -> HashMap<String, PackStreamValue> {
        let mut context: HashMap<String, PackStreamValue> = self
            .routing_context
            .iter()
            .map(|(k, v)| (k.clone(), PackStreamValue::from(v.as_str())))
            .collect();
        context.insert("address".to_string(), address.to_string().into());
        context
    }
}

// ============================================================================
// DriverConfigBuilder - 설정 빌더
// ============================================================================

/// 드라이버 설정 빌더
pub struct DriverConfigBuilder {
    config: DriverConfig,
}

impl DriverConfigBuilder {
    /// TLS 암호화 설정
    pub fn with_encrypted(mut self, encrypted: bool) -> Self {
        self.config.encrypted = encrypted;
        self
    }

    /// TLS 신뢰 전략 설정
    pub fn with_trust_strategy(mut self, strategy: TrustStrategy) -> Self {
        self.config.trust_strategy = strategy;
        self
    }

    /// 연결 풀 크기 설정
    pub fn with_max_pool_size(mut self, size: usize) -> Self {
        self.config.max_pool_size = size;
        self
    }

    /// 연결 타임아웃 설정
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// 연결 획득 타임아웃 설정
    pub fn with_connection_acquisition_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_acquisition_timeout = timeout;
        self
    }

    /// 연결 최대 수명 설정
    pub fn with_max_connection_lifetime(mut self, lifetime: Duration) -> Self {
        self.config.max_connection_lifetime = lifetime;
        self
    }

    /// 유휴 타임아웃 설정
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.config.idle_timeout = Some(timeout);
        self
    }

    /// 읽기 타임아웃 설정
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = Some(timeout);
        self
    }

    /// 최대 재시도 횟수 설정
    pub fn with_max_retry_count(mut self, count: usize) -> Self {
        self.config.max_retry_count = count;
        self
    }

    /// 첫 재시도 지연 설정
    pub fn with_initial_retry_delay(mut self, delay: Duration) -> Self {
        self.config.initial_retry_delay = delay;
        self
    }

    /// 재시도 지연 배수 설정
    pub fn with_retry_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.config.retry_backoff_multiplier = multiplier;
        self
    }

    /// 재시도 지터 비율 설정
    pub fn with_retry_jitter_factor(mut self, factor: f64) -> Self {
        self.config.retry_jitter_factor = factor;
        self
    }

    /// User Agent 설정
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    /// Fetch Size 설정
    pub fn with_fetch_size(mut self, size: i64) -> Self {
        self.config.fetch_size = size;
        self
    }

    /// 라우팅 정책 설정
    pub fn with_routing_policy(mut self, policy: RoutingPolicy) -> Self {
        self.config.routing_policy = policy;
        self
    }

    /// 빌드
    pub fn build(self) -> DriverConfig {
        self.config
    }
}

// ============================================================================
// Driver - 드라이버
// ============================================================================

/// 그래프 데이터베이스 드라이버
///
/// 연결 풀과 라우팅 테이블을 소유하며, 세션은 드라이버에서 만들어집니다.
/// 드라이버를 복제하지 말고 `Arc`로 공유하세요.
pub struct Driver {
    /// 설정
    config: Arc<DriverConfig>,
    /// 풀 + 라우팅
    router: Arc<Router>,
    /// 열린 상태
    open: RwLock<bool>,
}

impl Driver {
    /// 새 드라이버 생성
    pub fn new(uri: &str, auth: AuthToken) -> DriverResult<Self> {
        let config = DriverConfig::new(uri, auth)?;
        Self::with_config(config)
    }

    /// 설정으로 드라이버 생성
    pub fn with_config(config: DriverConfig) -> DriverResult<Self> {
        config.validate()?;
        let config = Arc::new(config);
        debug!(
            addresses = ?config.addresses,
            routing = config.routing,
            encrypted = config.encrypted,
            "Driver created"
        );
        Ok(Self {
            router: Arc::new(Router::new(config.clone())),
            config,
            open: RwLock::new(true),
        })
    }

    /// 세션 생성
    pub fn session(&self, config: SessionConfig) -> DriverResult<Session> {
        self.ensure_open()?;
        if let Some(fetch_size) = config.fetch_size {
            validate_fetch_size(fetch_size)?;
        }
        Ok(Session::new(self.config.clone(), self.router.clone(), config))
    }

    /// 기본 설정으로 세션 생성
    pub fn default_session(&self) -> DriverResult<Session> {
        self.session(SessionConfig::default())
    }

    /// 드라이버 설정
    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    /// 라우팅 모드 여부
    pub fn is_routing(&self) -> bool {
        self.config.routing
    }

    /// 드라이버 종료 (모든 풀 닫기)
    pub async fn close(&self) -> DriverResult<()> {
        {
            let mut open = self.open.write();
            if !*open {
                return Ok(());
            }
            *open = false;
        }
        self.router.close().await;
        debug!("Driver closed");
        Ok(())
    }

    /// 연결 테스트 (라우팅 모드에서는 라우팅 테이블까지 확인)
    pub async fn verify_connectivity(&self) -> DriverResult<ServerInfo> {
        self.ensure_open()?;
        self.router.verify_connectivity().await
    }

    /// 캐시된 라우팅 테이블 조회
    pub fn routing_table(&self, database: Option<&str>) -> Option<RoutingTable> {
        self.router.routing_table(database)
    }

    /// 열린 상태 확인
    fn ensure_open(&self) -> DriverResult<()> {
        if *self.open.read() {
            Ok(())
        } else {
            Err(DriverError::session("Driver is closed"))
        }
    }

    /// 메트릭 조회
    pub fn metrics(&self) -> DriverMetrics {
        let pools = self.router.pool_metrics();
        DriverMetrics {
            idle_connections: pools.iter().map(|p| p.idle).sum(),
            in_use_connections: pools.iter().map(|p| p.in_use).sum(),
            total_acquisitions: pools.iter().map(|p| p.total_acquired).sum(),
            total_connections_created: pools.iter().map(|p| p.total_created).sum(),
            pools,
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("addresses", &self.config.addresses)
            .field("routing", &self.config.routing)
            .field("open", &*self.open.read())
            .finish()
    }
}

// ============================================================================
// ServerInfo - 서버 정보
// ============================================================================

/// 서버 정보
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    /// 서버 주소
    pub address: ServerAddress,
    /// 서버 에이전트
    pub agent: String,
    /// 협상된 프로토콜 버전
    pub protocol_version: String,
}

impl fmt::Display for ServerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Server @ {} (Agent: {}, Protocol: {})",
            self.address, self.agent, self.protocol_version
        )
    }
}

// ============================================================================
// DriverMetrics - 드라이버 메트릭
// ============================================================================

/// 드라이버 메트릭 (모든 주소의 풀 합계)
#[derive(Debug, Clone, Default)]
pub struct DriverMetrics {
    /// 유휴 연결 수
    pub idle_connections: usize,
    /// 사용 중인 연결 수
    pub in_use_connections: usize,
    /// 총 연결 획득 횟수
    pub total_acquisitions: u64,
    /// 총 생성된 연결 수
    pub total_connections_created: u64,
    /// 주소별 풀 메트릭
    pub pools: Vec<PoolMetrics>,
}

// ============================================================================
// Tests
// ============================================================================
