//! 라우팅 정책
//!
//! 같은 역할의 서버들 중 하나를 고르는 전략

use std::sync::atomic::{AtomicUsize, Ordering};

use rand::Rng;

use super::super::driver::ServerAddress;

/// 라우팅 정책
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RoutingPolicy {
    /// 라운드 로빈 (기본값)
    #[default]
    RoundRobin,
    /// 사용 중 연결이 가장 적은 서버
    LeastConnections,
    /// 랜덤
    Random,
}

/// 서버 선택기
#[derive(Debug)]
pub struct ServerSelector {
    policy: RoutingPolicy,
    next: AtomicUsize,
}

impl ServerSelector {
    /// 새 선택기 생성
    pub fn new(policy: RoutingPolicy) -> Self {
        Self {
            policy,
            next: AtomicUsize::new(0),
        }
    }

    /// 서버 목록에서 하나 선택
    ///
    /// `load`는 서버별 사용 중 연결 수이며 `LeastConnections`에서만 쓰입니다.
    /// 동률이면 라운드 로빈 순서상 앞선 서버를 고릅니다.
    pub fn select<F>(&self, servers: &[ServerAddress], load: F) -> Option<ServerAddress>
    where
        F: Fn(&ServerAddress) -> usize,
    {
        if servers.is_empty() {
            return None;
        }

        let start = self.next.fetch_add(1, Ordering::Relaxed) % servers.len();
        let index = match self.policy {
            RoutingPolicy::RoundRobin => start,
            RoutingPolicy::Random => rand::thread_rng().gen_range(0..servers.len()),
            RoutingPolicy::LeastConnections => (0..servers.len())
                .map(|offset| (start + offset) % servers.len())
                .min_by_key(|&i| load(&servers[i]))
                .unwrap_or(start),
        };

        Some(servers[index].clone())
    }

    /// 현재 정책
    pub fn policy(&self) -> RoutingPolicy {
        self.policy
    }
}

impl Default for ServerSelector {
    fn default() -> Self {
        Self::new(RoutingPolicy::RoundRobin)
    }
}
