//! Driver Error Types
//!
//! 드라이버 에러 정의

use thiserror::Error;

use crate::bolt::{BoltError, BoltErrorCode, HandshakeError, PackStreamError};

// ============================================================================
// DriverError - 드라이버 에러
// ============================================================================

/// 드라이버 에러
///
/// 모든 변형은 [`DriverError::kind`]로 안정적인 분류 태그를 제공하므로
/// 메시지 문자열을 파싱하지 않고 분기할 수 있습니다.
#[derive(Error, Debug, Clone)]
pub enum DriverError {
    /// 핸드셰이크 실패 (재시도 없음)
    #[error("Handshake error: {0}")]
    Handshake(#[from] HandshakeError),

    /// 프로토콜 위반
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// 연결 에러 (연결은 폐기됨)
    #[error("Connection error: {0}")]
    Connection(String),

    /// 값 인코딩 에러
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// 일시적 서버 에러 (재시도 가능)
    #[error("Transient error: {code} - {message}")]
    Transient { code: String, message: String },

    /// 클라이언트 에러 (재시도 불가)
    #[error("Client error: {code} - {message}")]
    Client { code: String, message: String },

    /// 데이터베이스 에러
    #[error("Database error: {code} - {message}")]
    Database { code: String, message: String },

    /// 풀 고갈
    #[error("Pool exhausted: {0}")]
    PoolExhausted(String),

    /// 서비스 불가
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// 타임아웃
    #[error("Timeout: {0}")]
    Timeout(String),

    /// 세션 에러
    #[error("Session error: {0}")]
    Session(String),

    /// 트랜잭션 에러
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// 설정 에러
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// 타입 변환 에러
    #[error("Type conversion error: {0}")]
    TypeConversion(String),
}

impl DriverError {
    /// 연결 에러 생성
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// 프로토콜 에러 생성
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// 인코딩 에러 생성
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// 세션 에러 생성
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// 트랜잭션 에러 생성
    pub fn transaction(msg: impl Into<String>) -> Self {
        Self::Transaction(msg.into())
    }

    /// 타임아웃 에러 생성
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// 풀 고갈 에러 생성
    pub fn pool_exhausted(msg: impl Into<String>) -> Self {
        Self::PoolExhausted(msg.into())
    }

    /// 설정 에러 생성
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// 서비스 불가 에러 생성
    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    /// 타입 변환 에러 생성
    pub fn type_conversion(msg: impl Into<String>) -> Self {
        Self::TypeConversion(msg.into())
    }

    /// 서버 FAILURE 코드 분류
    ///
    /// - `Neo.ClientError.*` → Client
    /// - `Neo.TransientError.*` → Transient (단, 종료/중지된 트랜잭션은 Client)
    /// - NotALeader, ForbiddenOnReadOnlyDatabase → Transient (리더 전환)
    /// - 그 외 → Database
    pub fn from_failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        let code = code.into();
        let message = message.into();
        if code == BoltErrorCode::NOT_A_LEADER || code == BoltErrorCode::FORBIDDEN_ON_READ_ONLY {
            Self::Transient { code, message }
        } else if code == BoltErrorCode::TRANSACTION_TERMINATED
            || code == BoltErrorCode::LOCK_CLIENT_STOPPED
        {
            Self::Client { code, message }
        } else if code.starts_with("Neo.TransientError.") {
            Self::Transient { code, message }
        } else if code.starts_with("Neo.ClientError.") {
            Self::Client { code, message }
        } else {
            Self::Database { code, message }
        }
    }

    /// 안정적인 분류 태그
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Handshake(_) => "HandshakeError",
            Self::Protocol(_) => "ProtocolError",
            Self::Connection(_) => "ConnectionError",
            Self::Encoding(_) => "EncodingError",
            Self::Transient { .. } => "TransientError",
            Self::Client { .. } => "ClientError",
            Self::Database { .. } => "DatabaseError",
            Self::PoolExhausted(_) => "PoolExhaustedError",
            Self::ServiceUnavailable(_) => "ServiceUnavailableError",
            Self::Timeout(_) => "TimeoutError",
            Self::Session(_) => "SessionError",
            Self::Transaction(_) => "TransactionError",
            Self::Configuration(_) => "ConfigurationError",
            Self::TypeConversion(_) => "TypeConversionError",
        }
    }

    /// 서버 에러 코드 (서버 에러인 경우)
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Transient { code, .. } | Self::Client { code, .. } | Self::Database { code, .. } => {
                Some(code)
            }
            _ => None,
        }
    }

    /// 에러 메시지
    pub fn message(&self) -> String {
        match self {
            Self::Handshake(e) => e.to_string(),
            Self::Transient { message, .. }
            | Self::Client { message, .. }
            | Self::Database { message, .. } => message.clone(),
            Self::Protocol(m)
            | Self::Connection(m)
            | Self::Encoding(m)
            | Self::PoolExhausted(m)
            | Self::ServiceUnavailable(m)
            | Self::Timeout(m)
            | Self::Session(m)
            | Self::Transaction(m)
            | Self::Configuration(m)
            | Self::TypeConversion(m) => m.clone(),
        }
    }

    /// 재시도 가능 여부
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Connection(_))
    }

    /// 리더가 아닌 서버에 쓰기를 보낸 경우
    pub fn is_not_a_leader(&self) -> bool {
        matches!(
            self.code(),
            Some(BoltErrorCode::NOT_A_LEADER) | Some(BoltErrorCode::FORBIDDEN_ON_READ_ONLY)
        )
    }

    /// 연결을 더 이상 쓸 수 없게 만드는 에러 여부
    pub fn is_fatal_for_connection(&self) -> bool {
        matches!(
            self,
            Self::Handshake(_) | Self::Protocol(_) | Self::Connection(_) | Self::Timeout(_)
        )
    }
}

impl From<BoltError> for DriverError {
    fn from(err: BoltError) -> Self {
        match err {
            BoltError::Handshake(e) => Self::Handshake(e),
            BoltError::PackStream(e @ PackStreamError::ValueTooLarge(..)) => {
                Self::Encoding(e.to_string())
            }
            BoltError::PackStream(e) => Self::Protocol(e.to_string()),
            e @ (BoltError::Protocol(_) | BoltError::MessageTooLarge { .. }) => {
                Self::Protocol(e.to_string())
            }
            BoltError::Timeout => Self::Timeout("Bolt I/O timed out".to_string()),
            e @ (BoltError::Io(_) | BoltError::ConnectionClosed) => Self::Connection(e.to_string()),
        }
    }
}

// ============================================================================
// Result Type
// ============================================================================

/// 드라이버 결과 타입
pub type DriverResult<T> = Result<T, DriverError>;

// ============================================================================
// Tests
// ============================================================================
