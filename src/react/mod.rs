//! 回合层：Planner（模型调用）、Turn Engine（next 状态机）、过程事件

pub mod events;
pub mod loop_;
pub mod planner;

pub use events::TurnEvent;
pub use loop_::{Actor, RunContext, StepOutcome, TurnEngine};
pub use planner::{assign_call_ids, new_call_id, workflow_prompt, Planner};
