use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{sqlite_text_enum, ModelingParams};

/// Task下的一次建模尝试（训练、评估或盲测推理）
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Modeling {
    pub id: i64,
    pub task_id: i64,
    /// 0 表示根尝试
    pub parent_id: i64,
    pub modeling_type: ModelingType,
    pub step: ModelingStep,
    pub progress: f64,
    pub params: ModelingParams,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Modeling {
    pub fn is_terminal(&self) -> bool {
        self.step.is_terminal()
    }

    pub fn dispatch_endpoint(&self) -> DispatchEndpoint {
        self.modeling_type.dispatch_endpoint()
    }
}

/// 新建的建模尝试，总是以 `idle` 状态写入
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewModeling {
    pub task_id: i64,
    pub parent_id: i64,
    pub modeling_type: ModelingType,
    pub params: ModelingParams,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelingType {
    Initial,
    Update,
    Evaluation,
    Blind,
}

impl ModelingType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelingType::Initial => "initial",
            ModelingType::Update => "update",
            ModelingType::Evaluation => "evaluation",
            ModelingType::Blind => "blind",
        }
    }

    pub fn dispatch_endpoint(&self) -> DispatchEndpoint {
        match self {
            ModelingType::Initial | ModelingType::Update => DispatchEndpoint::Train,
            ModelingType::Evaluation => DispatchEndpoint::Evaluation,
            ModelingType::Blind => DispatchEndpoint::Blind,
        }
    }
}

impl FromStr for ModelingType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(ModelingType::Initial),
            "update" => Ok(ModelingType::Update),
            "evaluation" => Ok(ModelingType::Evaluation),
            "blind" => Ok(ModelingType::Blind),
            _ => Err(format!("Invalid modeling type: {s}")),
        }
    }
}

impl fmt::Display for ModelingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(ModelingType);

/// 建模步骤状态机
///
/// ```text
/// idle --dispatch--> request --worker--> run --worker--> finish --finalize/worker--> complete
///   \                   \                 \                  \
///    +-------cancel------+-------cancel----+                  +--worker--> fail
/// ```
///
/// `run`、`finish`、`fail`、`complete` 由远程Worker写入，本模块只负责
/// `idle -> request`、取消以及校验迁移是否合法。
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelingStep {
    Idle,
    Run,
    Request,
    Finish,
    Complete,
    Cancel,
    Fail,
}

impl ModelingStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelingStep::Idle => "idle",
            ModelingStep::Run => "run",
            ModelingStep::Request => "request",
            ModelingStep::Finish => "finish",
            ModelingStep::Complete => "complete",
            ModelingStep::Cancel => "cancel",
            ModelingStep::Fail => "fail",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ModelingStep::Complete | ModelingStep::Cancel | ModelingStep::Fail
        )
    }

    /// 非终态且已离开 `idle`，此时删除会被拒绝
    pub fn is_in_progress(&self) -> bool {
        !self.is_terminal() && *self != ModelingStep::Idle
    }

    /// 是否占用着已分配的GPU；`finish` 的GPU在收尾成功后释放
    pub fn holds_gpu(&self) -> bool {
        matches!(self, ModelingStep::Request | ModelingStep::Run)
    }

    pub fn is_cancellable(&self) -> bool {
        matches!(
            self,
            ModelingStep::Idle | ModelingStep::Request | ModelingStep::Run
        )
    }

    pub fn can_transition_to(&self, next: ModelingStep) -> bool {
        use ModelingStep::*;

        match (self, next) {
            (Idle, Request) => true,
            (Request, Run) => true,
            (Request | Run, Finish) => true,
            (Finish, Complete) => true,
            (Request | Run | Finish, Fail) => true,
            (Idle | Request | Run, Cancel) => true,
            _ => false,
        }
    }
}

impl FromStr for ModelingStep {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(ModelingStep::Idle),
            "run" => Ok(ModelingStep::Run),
            "request" => Ok(ModelingStep::Request),
            "finish" => Ok(ModelingStep::Finish),
            "complete" => Ok(ModelingStep::Complete),
            "cancel" => Ok(ModelingStep::Cancel),
            "fail" => Ok(ModelingStep::Fail),
            _ => Err(format!("Invalid modeling step: {s}")),
        }
    }
}

impl fmt::Display for ModelingStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

sqlite_text_enum!(ModelingStep);

/// Worker上接收建模请求的端点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchEndpoint {
    Train,
    Evaluation,
    Blind,
}

impl DispatchEndpoint {
    pub fn path(&self) -> &'static str {
        match self {
            DispatchEndpoint::Train => "/api/train",
            DispatchEndpoint::Evaluation => "/api/evaluation",
            DispatchEndpoint::Blind => "/api/vision/blind",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ModelingStep::*;

    #[test]
    fn test_terminal_steps() {
        for step in [Complete, Cancel, Fail] {
            assert!(step.is_terminal());
            assert!(!step.is_cancellable());
            assert!(!step.is_in_progress());
        }
        assert!(!Idle.is_terminal());
        assert!(!Idle.is_in_progress());
        assert!(Finish.is_in_progress());
    }

    #[test]
    fn test_transitions_out_of_terminal_steps_are_rejected() {
        let all = [Idle, Run, Request, Finish, Complete, Cancel, Fail];
        for from in [Complete, Cancel, Fail] {
            for to in all {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_cancel_is_reachable_from_idle_request_run_only() {
        assert!(Idle.can_transition_to(Cancel));
        assert!(Request.can_transition_to(Cancel));
        assert!(Run.can_transition_to(Cancel));
        assert!(!Finish.can_transition_to(Cancel));
        assert!(!Idle.can_transition_to(Run));
    }

    #[test]
    fn test_dispatch_endpoint_by_type() {
        assert_eq!(ModelingType::Initial.dispatch_endpoint().path(), "/api/train");
        assert_eq!(ModelingType::Update.dispatch_endpoint().path(), "/api/train");
        assert_eq!(
            ModelingType::Evaluation.dispatch_endpoint().path(),
            "/api/evaluation"
        );
        assert_eq!(
            ModelingType::Blind.dispatch_endpoint().path(),
            "/api/vision/blind"
        );
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        assert!("running".parse::<ModelingStep>().is_err());
        assert_eq!("request".parse::<ModelingStep>().unwrap(), Request);
    }
}
