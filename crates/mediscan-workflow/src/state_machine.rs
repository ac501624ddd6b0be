//! 诊断记录状态机
//!
//! 管理诊断记录的生命周期状态转换

use mediscan_core::{AnalysisState, MediscanError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 诊断记录状态转换事件
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnalysisEvent {
    Save,
    Review,
    GenerateReport,
}

/// 诊断记录状态机
#[derive(Debug)]
pub struct AnalysisStateMachine {
    transitions: HashMap<(AnalysisState, AnalysisEvent), AnalysisState>,
}

impl AnalysisStateMachine {
    pub fn new() -> Self {
        use AnalysisEvent::*;
        use AnalysisState::*;

        let mut transitions = HashMap::new();

        transitions.insert((Uploaded, Save), Saved);
        transitions.insert((Saved, Review), Reviewed);
        transitions.insert((Reviewed, Review), Reviewed);
        // 报告生成后仍允许管理员修订，报告标记保留
        transitions.insert((ReportGenerated, Review), ReportGenerated);
        transitions.insert((Saved, GenerateReport), ReportGenerated);
        transitions.insert((Reviewed, GenerateReport), ReportGenerated);
        transitions.insert((ReportGenerated, GenerateReport), ReportGenerated);

        Self { transitions }
    }

    pub fn transition(&self, from: AnalysisState, event: AnalysisEvent) -> Result<AnalysisState> {
        self.transitions
            .get(&(from, event))
            .copied()
            .ok_or_else(|| MediscanError::InvalidStateTransition {
                from: format!("{:?}", from),
                event: format!("{:?}", event),
            })
    }
}

impl Default for AnalysisStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
