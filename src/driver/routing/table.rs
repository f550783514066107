//! 라우팅 테이블
//!
//! 데이터베이스별로 클러스터 서버의 역할 목록을 관리합니다.

use std::time::{Duration, Instant};

use crate::bolt::{AccessMode, RoutingInfo, ServerRole};

use super::super::driver::ServerAddress;
use super::super::error::{DriverError, DriverResult};

/// 라우팅 테이블
#[derive(Debug, Clone)]
pub struct RoutingTable {
    /// 데이터베이스 이름 (None이면 서버 기본 데이터베이스)
    pub database: Option<String>,
    /// 라우터 목록 (라우팅 테이블 조회용)
    pub routers: Vec<ServerAddress>,
    /// 라이터 목록 (쓰기 트랜잭션용)
    pub writers: Vec<ServerAddress>,
    /// 리더 목록 (읽기 트랜잭션용)
    pub readers: Vec<ServerAddress>,
    /// 유효 기간
    pub ttl: Duration,
    /// 갱신 시간
    pub updated_at: Instant,
}

impl RoutingTable {
    /// 빈 테이블 생성 (즉시 만료)
    pub fn new(database: Option<String>) -> Self {
        Self {
            database,
            routers: Vec::new(),
            writers: Vec::new(),
            readers: Vec::new(),
            ttl: Duration::ZERO,
            updated_at: Instant::now(),
        }
    }

    /// 서버 응답으로 테이블 생성
    ///
    /// 서버가 데이터베이스 이름을 알려주면 그 이름을 씁니다.
    pub fn from_info(requested: Option<&str>, info: &RoutingInfo) -> DriverResult<Self> {
        let mut table = Self::new(info.db.clone().or_else(|| requested.map(String::from)));
        table.ttl = Duration::from_secs(info.ttl.max(0) as u64);

        for (role, addresses) in &info.servers {
            for address in addresses {
                let address = ServerAddress::parse(address).map_err(|e| {
                    DriverError::protocol(format!("Routing table entry rejected: {}", e.message()))
                })?;
                table.add_server(*role, address);
            }
        }
        Ok(table)
    }

    /// 역할별 서버 추가 (중복 무시)
    pub fn add_server(&mut self, role: ServerRole, address: ServerAddress) {
        let list = match role {
            ServerRole::Route => &mut self.routers,
            ServerRole::Write => &mut self.writers,
            ServerRole::Read => &mut self.readers,
        };
        if !list.contains(&address) {
            list.push(address);
        }
    }

    /// 접근 모드에 맞는 서버 목록
    pub fn servers_for(&self, mode: AccessMode) -> &[ServerAddress] {
        match mode {
            AccessMode::Write => &self.writers,
            AccessMode::Read => &self.readers,
        }
    }

    /// TTL 경과 여부
    pub fn is_expired(&self) -> bool {
        self.updated_at.elapsed() >= self.ttl
    }

    /// 갱신 없이 해당 모드에 쓸 수 있는지
    pub fn is_fresh_for(&self, mode: AccessMode) -> bool {
        !self.is_expired() && !self.routers.is_empty() && !self.servers_for(mode).is_empty()
    }

    /// 모든 역할에서 서버 제거
    pub fn forget(&mut self, address: &ServerAddress) {
        self.routers.retain(|a| a != address);
        self.writers.retain(|a| a != address);
        self.readers.retain(|a| a != address);
    }

    /// 라이터 목록에서만 제거 (리더가 바뀐 경우)
    pub fn forget_writer(&mut self, address: &ServerAddress) {
        self.writers.retain(|a| a != address);
    }

    /// 테이블에 등장하는 모든 서버 (중복 제거)
    pub fn servers(&self) -> Vec<ServerAddress> {
        let mut all: Vec<ServerAddress> = Vec::new();
        for address in self.routers.iter().chain(&self.writers).chain(&self.readers) {
            if !all.contains(address) {
                all.push(address.clone());
            }
        }
        all
    }
}
