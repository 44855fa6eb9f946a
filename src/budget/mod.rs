//! Budget controller
//!
//! Per-task ledgers of API calls, tokens, cost, and recursion depth, each
//! with a hard limit scaled by a tier multiplier. Threshold warnings at 50%
//! and 80% and the 100% exhaustion signal are each emitted at most once per
//! budget.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Budget tier scaling the base limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BudgetTier {
    Minimal,
    #[default]
    Standard,
    Enhanced,
    Critical,
}

impl BudgetTier {
    pub fn multiplier(&self) -> f64 {
        match self {
            BudgetTier::Minimal => 0.25,
            BudgetTier::Standard => 1.0,
            BudgetTier::Enhanced => 2.0,
            BudgetTier::Critical => 4.0,
        }
    }
}

/// The budgeted resources
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetResource {
    ApiCalls,
    Tokens,
    Cost,
    Depth,
}

impl std::fmt::Display for BudgetResource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BudgetResource::ApiCalls => "apiCalls",
            BudgetResource::Tokens => "tokens",
            BudgetResource::Cost => "cost",
            BudgetResource::Depth => "depth",
        };
        write!(f, "{}", name)
    }
}

/// Budget errors
#[derive(Debug, Error)]
pub enum BudgetError {
    #[error("budget exceeded for {resource}: used {used} of {limit}")]
    Exceeded {
        resource: BudgetResource,
        used: f64,
        limit: f64,
    },

    #[error("no budget for task {0}")]
    Unknown(String),
}

/// Base limits before tier scaling
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BudgetLimits {
    pub max_api_calls: u64,
    pub max_tokens: u64,
    pub max_cost_usd: f64,
    pub max_depth: u32,
}

impl Default for BudgetLimits {
    fn default() -> Self {
        Self {
            max_api_calls: 50,
            max_tokens: 200_000,
            max_cost_usd: 1.0,
            max_depth: 5,
        }
    }
}

/// Warning severity attached to threshold crossings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarnLevel {
    /// >= 50% utilization
    Medium,
    /// >= 80% utilization
    High,
    /// 100%: the budget is exhausted
    Exhausted,
}

/// A threshold crossing observed while recording usage
#[derive(Debug, Clone)]
pub struct BudgetWarning {
    pub task_id: String,
    pub level: WarnLevel,
    pub utilization: f64,
}

/// Per-task ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub task_id: String,
    pub tier: BudgetTier,
    pub limits: BudgetLimits,

    pub used_api_calls: u64,
    pub used_tokens: u64,
    pub used_cost_usd: f64,
    pub depth: u32,

    /// Auto-scale factor applied on top of the tier multiplier
    pub scale: f64,

    pub exhausted: bool,

    /// Highest warning level already emitted, keeping thresholds monotonic
    #[serde(skip)]
    warned: Option<WarnLevelMark>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum WarnLevelMark {
    Medium,
    High,
    Exhausted,
}

impl Budget {
    fn new(task_id: String, tier: BudgetTier, limits: BudgetLimits) -> Self {
        Self {
            task_id,
            tier,
            limits,
            used_api_calls: 0,
            used_tokens: 0,
            used_cost_usd: 0.0,
            depth: 0,
            scale: 1.0,
            exhausted: false,
            warned: None,
        }
    }

    fn factor(&self) -> f64 {
        self.tier.multiplier() * self.scale
    }

    pub fn limit_api_calls(&self) -> f64 {
        self.limits.max_api_calls as f64 * self.factor()
    }

    pub fn limit_tokens(&self) -> f64 {
        self.limits.max_tokens as f64 * self.factor()
    }

    pub fn limit_cost_usd(&self) -> f64 {
        self.limits.max_cost_usd * self.factor()
    }

    pub fn limit_depth(&self) -> f64 {
        self.limits.max_depth as f64 * self.factor()
    }

    pub fn remaining_api_calls(&self) -> f64 {
        (self.limit_api_calls() - self.used_api_calls as f64).max(0.0)
    }

    pub fn remaining_tokens(&self) -> f64 {
        (self.limit_tokens() - self.used_tokens as f64).max(0.0)
    }

    pub fn remaining_cost_usd(&self) -> f64 {
        (self.limit_cost_usd() - self.used_cost_usd).max(0.0)
    }

    /// Highest utilization across all resources, 0.0 to 1.0+
    pub fn utilization(&self) -> f64 {
        let ratios = [
            self.used_api_calls as f64 / self.limit_api_calls().max(f64::EPSILON),
            self.used_tokens as f64 / self.limit_tokens().max(f64::EPSILON),
            self.used_cost_usd / self.limit_cost_usd().max(f64::EPSILON),
            f64::from(self.depth) / self.limit_depth().max(f64::EPSILON),
        ];
        ratios.into_iter().fold(0.0, f64::max)
    }

    /// First resource at or over its limit, if any
    fn exceeded_resource(&self) -> Option<(BudgetResource, f64, f64)> {
        if self.used_api_calls as f64 >= self.limit_api_calls() {
            return Some((BudgetResource::ApiCalls, self.used_api_calls as f64, self.limit_api_calls()));
        }
        if self.used_tokens as f64 >= self.limit_tokens() {
            return Some((BudgetResource::Tokens, self.used_tokens as f64, self.limit_tokens()));
        }
        if self.used_cost_usd >= self.limit_cost_usd() {
            return Some((BudgetResource::Cost, self.used_cost_usd, self.limit_cost_usd()));
        }
        if f64::from(self.depth) >= self.limit_depth() {
            return Some((BudgetResource::Depth, f64::from(self.depth), self.limit_depth()));
        }
        None
    }

    /// Warning for the current utilization, deduplicated per threshold
    fn threshold_warning(&mut self) -> Option<BudgetWarning> {
        let utilization = self.utilization();
        let mark = if utilization >= 1.0 {
            WarnLevelMark::Exhausted
        } else if utilization >= 0.8 {
            WarnLevelMark::High
        } else if utilization >= 0.5 {
            WarnLevelMark::Medium
        } else {
            return None;
        };

        if self.warned.is_some_and(|w| w >= mark) {
            return None;
        }
        self.warned = Some(mark);

        let level = match mark {
            WarnLevelMark::Medium => WarnLevel::Medium,
            WarnLevelMark::High => WarnLevel::High,
            WarnLevelMark::Exhausted => {
                self.exhausted = true;
                WarnLevel::Exhausted
            }
        };

        Some(BudgetWarning {
            task_id: self.task_id.clone(),
            level,
            utilization,
        })
    }
}

/// Process-wide counters
#[derive(Debug, Clone, Default)]
pub struct BudgetStats {
    pub active: usize,
    pub total_created: u64,
    pub total_exhausted: u64,
}

impl BudgetStats {
    pub fn exhaustion_rate(&self) -> f64 {
        if self.total_created == 0 {
            0.0
        } else {
            self.total_exhausted as f64 / self.total_created as f64
        }
    }
}

struct ControllerInner {
    budgets: HashMap<String, Budget>,
    total_created: u64,
    total_exhausted: u64,
}

/// Accounts budgets for every task of a run
///
/// Every operation on a single budget is atomic: the whole map sits behind
/// one mutex and no operation awaits while holding it.
pub struct BudgetController {
    limits: BudgetLimits,
    auto_scale: bool,
    inner: Mutex<ControllerInner>,
}

impl BudgetController {
    pub fn new(limits: BudgetLimits, auto_scale: bool) -> Self {
        debug!(?limits, auto_scale, "BudgetController::new: called");
        Self {
            limits,
            auto_scale,
            inner: Mutex::new(ControllerInner {
                budgets: HashMap::new(),
                total_created: 0,
                total_exhausted: 0,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ControllerInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create a budget for a task; replaces any existing one
    pub fn create_budget(&self, task_id: &str, tier: BudgetTier) -> Budget {
        debug!(task_id, ?tier, "create_budget: called");
        let mut inner = self.lock();
        inner.total_created += 1;
        let budget = Budget::new(task_id.to_string(), tier, self.limits);
        if inner.budgets.insert(task_id.to_string(), budget.clone()).is_some() {
            debug!(task_id, "create_budget: replaced existing budget");
        }
        debug!(task_id, total_created = inner.total_created, "create_budget: budget created");
        budget
    }

    /// Record one API call with its tokens and cost
    ///
    /// Returns any newly-crossed threshold warnings (at most one per call).
    pub fn record_api_call(&self, task_id: &str, tokens: u64, cost_usd: f64) -> Result<Vec<BudgetWarning>, BudgetError> {
        debug!(task_id, tokens, cost_usd, "record_api_call: called");
        let mut inner = self.lock();
        let budget = inner
            .budgets
            .get_mut(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;

        budget.used_api_calls += 1;
        budget.used_tokens += tokens;
        budget.used_cost_usd += cost_usd;
        debug!(
            task_id,
            used_api_calls = budget.used_api_calls,
            used_tokens = budget.used_tokens,
            used_cost_usd = budget.used_cost_usd,
            utilization = budget.utilization(),
            "record_api_call: usage recorded"
        );

        let mut warnings = Vec::new();
        if let Some(warning) = budget.threshold_warning() {
            if warning.level == WarnLevel::Exhausted {
                warn!(task_id, utilization = warning.utilization, "budget exhausted");
            } else {
                warn!(task_id, level = ?warning.level, utilization = warning.utilization, "budget warning");
            }
            warnings.push(warning);
        }
        Ok(warnings)
    }

    pub fn record_depth_increase(&self, task_id: &str) -> Result<(), BudgetError> {
        debug!(task_id, "record_depth_increase: called");
        let mut inner = self.lock();
        let budget = inner
            .budgets
            .get_mut(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;
        budget.depth += 1;
        debug!(task_id, depth = budget.depth, "record_depth_increase: depth incremented");
        Ok(())
    }

    pub fn record_depth_decrease(&self, task_id: &str) -> Result<(), BudgetError> {
        debug!(task_id, "record_depth_decrease: called");
        let mut inner = self.lock();
        let budget = inner
            .budgets
            .get_mut(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;
        budget.depth = budget.depth.saturating_sub(1);
        debug!(task_id, depth = budget.depth, "record_depth_decrease: depth decremented");
        Ok(())
    }

    /// Error if any resource is at or over its limit
    pub fn check_budget(&self, task_id: &str) -> Result<(), BudgetError> {
        debug!(task_id, "check_budget: called");
        let inner = self.lock();
        let budget = inner
            .budgets
            .get(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;
        match budget.exceeded_resource() {
            Some((resource, used, limit)) => {
                debug!(task_id, %resource, used, limit, "check_budget: limit exceeded");
                Err(BudgetError::Exceeded { resource, used, limit })
            }
            None => {
                debug!(task_id, utilization = budget.utilization(), "check_budget: within limits");
                Ok(())
            }
        }
    }

    /// Boolean form of [`check_budget`](Self::check_budget)
    pub fn has_budget(&self, task_id: &str) -> bool {
        debug!(task_id, "has_budget: called");
        self.check_budget(task_id).is_ok()
    }

    /// Scale a budget's limits; only effective with auto-scale enabled
    pub fn scale_budget(&self, task_id: &str, multiplier: f64) -> Result<bool, BudgetError> {
        debug!(task_id, multiplier, "scale_budget: called");
        if !self.auto_scale {
            debug!(task_id, "scale_budget ignored: auto-scale disabled");
            return Ok(false);
        }
        let mut inner = self.lock();
        let budget = inner
            .budgets
            .get_mut(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;
        budget.scale *= multiplier.max(0.0);
        budget.exhausted = false;
        debug!(task_id, scale = budget.scale, "budget scaled");
        Ok(true)
    }

    /// Remove and return the final budget state
    pub fn release_budget(&self, task_id: &str) -> Result<Budget, BudgetError> {
        debug!(task_id, "release_budget: called");
        let mut inner = self.lock();
        let budget = inner
            .budgets
            .remove(task_id)
            .ok_or_else(|| BudgetError::Unknown(task_id.to_string()))?;
        if budget.exhausted {
            inner.total_exhausted += 1;
            debug!(task_id, total_exhausted = inner.total_exhausted, "release_budget: exhausted release counted");
        }
        debug!(task_id, exhausted = budget.exhausted, "release_budget: budget released");
        Ok(budget)
    }

    pub fn stats(&self) -> BudgetStats {
        debug!("stats: called");
        let inner = self.lock();
        BudgetStats {
            active: inner.budgets.len(),
            total_created: inner.total_created,
            total_exhausted: inner.total_exhausted,
        }
    }
}

impl Default for BudgetController {
    fn default() -> Self {
        Self::new(BudgetLimits::default(), false)
    }
}
