//! 应用层错误定义
//!
//! 统一的命令/查询错误类型。分类:
//! Parse / CapacityExceeded / Validation / TransientSynthesis / PermanentSynthesis，
//! 每个分类都带 [`ErrorContext`]（job、片段、阶段），用于断点续传和排查。
//! 返回给用户的只有分类和不透明的错误引用号，内部错误原文只进日志。

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::application::ports::{JobFailure, QueueError, RepositoryError, StorageError, TtsError};
use crate::domain::{DomainError, Phase, SegmentType};

/// 错误上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ErrorContext {
    pub job_id: Uuid,
    pub segment_id: Option<Uuid>,
    pub phase: Phase,
}

impl ErrorContext {
    pub fn new(job_id: Uuid, phase: Phase) -> Self {
        Self {
            job_id,
            segment_id: None,
            phase,
        }
    }

    pub fn with_segment(mut self, segment_id: Uuid) -> Self {
        self.segment_id = Some(segment_id);
        self
    }
}

impl std::fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job={} phase={}", self.job_id, self.phase)?;
        if let Some(segment_id) = self.segment_id {
            write!(f, " segment={}", segment_id)?;
        }
        Ok(())
    }
}

/// 应用层错误
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// 稿件内容无法处理
    #[error("Parse error ({context}): {message}")]
    Parse {
        context: ErrorContext,
        message: String,
    },

    /// 类型保留区间已满
    #[error("Capacity exceeded ({context}): {segment_type} holds at most {capacity}")]
    CapacityExceeded {
        context: ErrorContext,
        segment_type: SegmentType,
        capacity: u8,
    },

    /// 验证错误，在持久化之前拒绝
    #[error("Validation error ({context}): {message}")]
    Validation {
        context: ErrorContext,
        message: String,
    },

    /// 可重试的合成错误（自动重试用尽后才会出现）
    #[error("Transient synthesis error ({context}) after {attempts} attempts: {message}")]
    TransientSynthesis {
        context: ErrorContext,
        message: String,
        attempts: u32,
    },

    /// 永久合成错误
    #[error("Permanent synthesis error ({context}): {message}")]
    PermanentSynthesis {
        context: ErrorContext,
        message: String,
    },

    /// 资源未找到
    #[error("{resource_type} not found: {id}")]
    NotFound {
        resource_type: &'static str,
        id: Uuid,
    },

    /// 状态无效
    #[error("Invalid state ({context}): {message}")]
    InvalidState {
        context: ErrorContext,
        message: String,
    },

    /// 仓储错误
    #[error("Repository error: {0}")]
    RepositoryError(String),

    /// 存储错误
    #[error("Storage error: {0}")]
    StorageError(String),

    /// 内部错误
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// 面向用户的错误信息，不含内部错误原文
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserFacingError {
    pub classification: String,
    pub reference: String,
    pub guidance: String,
}

impl ApplicationError {
    /// 创建 NotFound 错误
    pub fn not_found(resource_type: &'static str, id: Uuid) -> Self {
        Self::NotFound { resource_type, id }
    }

    /// 创建验证错误
    pub fn validation(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::Validation {
            context,
            message: message.into(),
        }
    }

    /// 创建状态无效错误
    pub fn invalid_state(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::InvalidState {
            context,
            message: message.into(),
        }
    }

    pub fn parse(context: ErrorContext, message: impl Into<String>) -> Self {
        Self::Parse {
            context,
            message: message.into(),
        }
    }

    /// 创建内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::InternalError(message.into())
    }

    /// 领域错误映射到分类
    pub fn from_domain(err: DomainError, context: ErrorContext) -> Self {
        match err {
            DomainError::EmptyManuscript => Self::parse(context, err.to_string()),
            DomainError::CapacityExceeded {
                segment_type,
                capacity,
            } => Self::CapacityExceeded {
                context,
                segment_type,
                capacity,
            },
            DomainError::OrderOutOfRange { .. }
            | DomainError::OrderInUse { .. }
            | DomainError::NoEligibleBodyChapter
            | DomainError::RetailSampleRequired { .. } => {
                Self::validation(context, err.to_string())
            }
            DomainError::InvalidTransition { .. }
            | DomainError::IncompleteSegments { .. }
            | DomainError::MissingAudio { .. } => Self::invalid_state(context, err.to_string()),
        }
    }

    /// 仓储错误映射，事务内触发的领域规则保留分类
    pub fn from_repository(err: RepositoryError, context: ErrorContext) -> Self {
        match err {
            RepositoryError::Domain(domain) => Self::from_domain(domain, context),
            RepositoryError::Conflict(message) => Self::invalid_state(context, message),
            RepositoryError::NotFound(message) => Self::validation(context, message),
            other => Self::RepositoryError(other.to_string()),
        }
    }

    /// 合成错误映射
    pub fn from_synthesis(err: TtsError, attempts: u32, context: ErrorContext) -> Self {
        match err {
            TtsError::Transient { message, .. } => Self::TransientSynthesis {
                context,
                message,
                attempts,
            },
            TtsError::Permanent(message) => Self::PermanentSynthesis { context, message },
        }
    }

    /// 重试终止后的合成错误映射
    ///
    /// 分类取最后一次尝试；消息以第一次失败开头，原始错误不会被后续尝试覆盖。
    pub fn from_retry_terminal(
        first: Option<TtsError>,
        last: TtsError,
        attempts: u32,
        context: ErrorContext,
    ) -> Self {
        let last_message = last.to_string();
        let original = first
            .map(|e| e.to_string())
            .filter(|message| *message != last_message);

        match (Self::from_synthesis(last, attempts, context), original) {
            (
                Self::TransientSynthesis {
                    context,
                    message,
                    attempts,
                },
                Some(original),
            ) => Self::TransientSynthesis {
                context,
                message: format!("{}; last attempt: {}", original, message),
                attempts,
            },
            (Self::PermanentSynthesis { context, message }, Some(original)) => {
                Self::PermanentSynthesis {
                    context,
                    message: format!("{}; last attempt: {}", original, message),
                }
            }
            (err, _) => err,
        }
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Self::Parse { context, .. }
            | Self::CapacityExceeded { context, .. }
            | Self::Validation { context, .. }
            | Self::TransientSynthesis { context, .. }
            | Self::PermanentSynthesis { context, .. }
            | Self::InvalidState { context, .. } => Some(context),
            _ => None,
        }
    }

    pub fn classification(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse_error",
            Self::CapacityExceeded { .. } => "capacity_exceeded",
            Self::Validation { .. } => "validation_error",
            Self::TransientSynthesis { .. } => "transient_synthesis_error",
            Self::PermanentSynthesis { .. } => "permanent_synthesis_error",
            Self::NotFound { .. } => "not_found",
            Self::InvalidState { .. } => "invalid_state",
            Self::RepositoryError(_) => "repository_error",
            Self::StorageError(_) => "storage_error",
            Self::InternalError(_) => "internal_error",
        }
    }

    /// 不透明错误引用号，同一错误总是得到同一引用号
    pub fn reference(&self) -> String {
        let digest = md5::compute(format!("{}:{}", self.classification(), self));
        format!("ERR-{}", &format!("{:x}", digest)[..12])
    }

    /// 面向用户的错误信息
    pub fn user_facing(&self) -> UserFacingError {
        let guidance = match self {
            Self::Parse { .. } => {
                "The manuscript could not be split into chapters. Check that it contains readable text \
                 and merge chapters if a section exceeds its distribution limit."
                    .to_string()
            }
            Self::CapacityExceeded {
                segment_type,
                capacity,
                ..
            } => format!(
                "Too many {} segments (at most {}). Merge chapters and try again.",
                segment_type, capacity
            ),
            Self::Validation { .. } => "The requested change is not valid for this job.".to_string(),
            Self::TransientSynthesis { .. } => {
                "Speech synthesis was temporarily unavailable. Retry the job later.".to_string()
            }
            Self::PermanentSynthesis { .. } => {
                "Speech synthesis rejected part of this book. Contact support with the reference.".to_string()
            }
            Self::NotFound { resource_type, .. } => format!("The {} does not exist.", resource_type),
            Self::InvalidState { .. } => {
                "The job is not in a state that allows this operation.".to_string()
            }
            Self::RepositoryError(_) | Self::StorageError(_) | Self::InternalError(_) => {
                "An internal error occurred. Contact support with the reference.".to_string()
            }
        };

        UserFacingError {
            classification: self.classification().to_string(),
            reference: self.reference(),
            guidance,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientSynthesis { .. })
    }

    /// 生成持久化的失败记录，内部原文保存在 message 中供排查
    pub fn to_failure(&self, fallback_phase: Phase) -> JobFailure {
        let facing = self.user_facing();
        let context = self.context();
        JobFailure {
            classification: facing.classification,
            reference: facing.reference,
            guidance: facing.guidance,
            message: self.to_string(),
            phase: context.map(|c| c.phase).unwrap_or(fallback_phase),
            segment_id: context.and_then(|c| c.segment_id),
        }
    }
}

impl From<RepositoryError> for ApplicationError {
    fn from(err: RepositoryError) -> Self {
        Self::RepositoryError(err.to_string())
    }
}

impl From<StorageError> for ApplicationError {
    fn from(err: StorageError) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<QueueError> for ApplicationError {
    fn from(err: QueueError) -> Self {
        Self::InternalError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::TransientKind;

    fn ctx() -> ErrorContext {
        ErrorContext::new(Uuid::new_v4(), Phase::Synthesis).with_segment(Uuid::new_v4())
    }

    #[test]
    fn test_user_facing_hides_internal_text() {
        let err = ApplicationError::PermanentSynthesis {
            context: ctx(),
            message: "upstream said: secret-token=abc123 invalid".to_string(),
        };
        let facing = err.user_facing();

        assert_eq!(facing.classification, "permanent_synthesis_error");
        assert!(facing.reference.starts_with("ERR-"));
        assert_eq!(facing.reference.len(), 16);
        assert!(!facing.guidance.contains("secret"));
        assert!(!facing.guidance.contains("upstream"));
    }

    #[test]
    fn test_retry_terminal_leads_with_first_error() {
        let err = ApplicationError::from_retry_terminal(
            Some(TtsError::transient(TransientKind::RateLimited, "429 rate limit exceeded")),
            TtsError::transient(TransientKind::Timeout, "t4"),
            4,
            ctx(),
        );
        assert_eq!(err.classification(), "transient_synthesis_error");
        let text = err.to_string();
        assert!(text.contains("after 4 attempts: 429 rate limit exceeded; last attempt: t4"));

        let same = ApplicationError::from_retry_terminal(
            Some(TtsError::transient(TransientKind::RateLimited, "429")),
            TtsError::transient(TransientKind::RateLimited, "429"),
            4,
            ctx(),
        );
        assert!(same.to_string().ends_with("after 4 attempts: 429"));

        let permanent = ApplicationError::from_retry_terminal(
            Some(TtsError::transient(TransientKind::Timeout, "timed out")),
            TtsError::permanent("voice not found"),
            2,
            ctx(),
        );
        assert_eq!(permanent.classification(), "permanent_synthesis_error");
        assert!(permanent.to_string().contains("timed out; last attempt: voice not found"));
    }

    #[test]
    fn test_reference_is_stable() {
        let context = ctx();
        let a = ApplicationError::parse(context, "empty");
        let b = ApplicationError::parse(context, "empty");
        assert_eq!(a.reference(), b.reference());
        assert_ne!(
            a.reference(),
            ApplicationError::parse(context, "other").reference()
        );
    }

    #[test]
    fn test_domain_mapping_keeps_context() {
        let context = ErrorContext::new(Uuid::new_v4(), Phase::Review);
        let err = ApplicationError::from_repository(
            RepositoryError::Domain(DomainError::CapacityExceeded {
                segment_type: SegmentType::BodyChapter,
                capacity: 70,
            }),
            context,
        );

        assert_eq!(err.classification(), "capacity_exceeded");
        assert_eq!(err.context(), Some(&context));
        assert!(err.user_facing().guidance.contains("Merge chapters"));
    }

    #[test]
    fn test_synthesis_mapping() {
        let err = ApplicationError::from_synthesis(
            TtsError::from_status(429, "slow down"),
            4,
            ctx(),
        );
        assert!(err.is_transient());
        assert!(err.to_string().contains("slow down"));
    }
}
