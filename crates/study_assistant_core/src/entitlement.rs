//! crates/study_assistant_core/src/entitlement.rs
//!
//! Daily per-user, per-feature quotas.
//!
//! Every gated operation calls [`EntitlementLedger::admit`] before doing any work. An
//! admitted call is counted immediately, so a generation that later fails still uses up
//! one unit for the day. Counters are keyed by `(identity, feature, day)`; yesterday's
//! counters are never read again and are never pruned.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::{info, warn};

use crate::ports::{Calendar, PortResult, SystemCalendar, UsageCounter};

//=========================================================================================
// Features, Tiers and Limits
//=========================================================================================

/// A gated capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    NoteGenerations,
    NoteRegenerations,
    Tests,
    Flashcards,
    Flowcharts,
    FlowchartRegenerations,
    AviatorMessages,
}

impl Feature {
    pub const ALL: [Feature; 7] = [
        Feature::NoteGenerations,
        Feature::NoteRegenerations,
        Feature::Tests,
        Feature::Flashcards,
        Feature::Flowcharts,
        Feature::FlowchartRegenerations,
        Feature::AviatorMessages,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoteGenerations => "note_generations",
            Self::NoteRegenerations => "note_regenerations",
            Self::Tests => "tests",
            Self::Flashcards => "flashcards",
            Self::Flowcharts => "flowcharts",
            Self::FlowchartRegenerations => "flowchart_regenerations",
            Self::AviatorMessages => "aviator_messages",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == s)
            .ok_or(())
    }
}

/// A subscription level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Ultra,
}

impl Tier {
    /// Normalises a client-declared tier name. Unknown or missing names become `Free`.
    pub fn normalize(name: Option<&str>) -> Self {
        match name.map(|n| n.trim().to_lowercase()).as_deref() {
            Some("pro") => Self::Pro,
            Some("ultra") => Self::Ultra,
            _ => Self::Free,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Pro => "pro",
            Self::Ultra => "ultra",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A daily allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Finite(u64),
    Unlimited,
}

impl Serialize for Limit {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Finite(n) => serializer.serialize_u64(*n),
            Self::Unlimited => serializer.serialize_str("Unlimited"),
        }
    }
}

impl fmt::Display for Limit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(n) => write!(f, "{n}"),
            Self::Unlimited => f.write_str("Unlimited"),
        }
    }
}

/// Non-metered perks that come with a tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TierFlags {
    pub advanced_mode: bool,
    pub all_themes: bool,
    pub no_ads: bool,
}

/// The static (tier, feature) → limit table.
///
/// `limit` matches exhaustively on both enums, so adding a feature or tier without a
/// limit is a compile error rather than a runtime lookup miss.
#[derive(Debug, Clone, Copy, Default)]
pub struct TierLimits;

impl TierLimits {
    pub fn limit(&self, tier: Tier, feature: Feature) -> Limit {
        use Feature::*;
        use Limit::{Finite, Unlimited};

        match (tier, feature) {
            (Tier::Free, NoteGenerations) => Finite(1),
            (Tier::Free, NoteRegenerations) => Finite(2),
            (Tier::Free, Tests) => Finite(2),
            (Tier::Free, Flashcards) => Finite(3),
            (Tier::Free, Flowcharts) => Finite(2),
            (Tier::Free, FlowchartRegenerations) => Finite(1),
            (Tier::Free, AviatorMessages) => Finite(10),

            (Tier::Pro, NoteGenerations) => Finite(15),
            (Tier::Pro, NoteRegenerations) => Finite(50),
            (Tier::Pro, Tests) => Finite(30),
            (Tier::Pro, Flashcards) => Finite(20),
            (Tier::Pro, Flowcharts) => Finite(20),
            (Tier::Pro, FlowchartRegenerations) => Finite(50),
            (Tier::Pro, AviatorMessages) => Unlimited,

            (Tier::Ultra, _) => Unlimited,
        }
    }

    /// Looks a feature up by name. Names that are not modelled get a limit of zero.
    pub fn limit_by_name(&self, tier: Tier, feature: &str) -> Limit {
        feature
            .parse::<Feature>()
            .map(|f| self.limit(tier, f))
            .unwrap_or(Limit::Finite(0))
    }

    pub fn flags(&self, tier: Tier) -> TierFlags {
        let paid = tier != Tier::Free;
        TierFlags {
            advanced_mode: paid,
            all_themes: paid,
            no_ads: paid,
        }
    }
}

//=========================================================================================
// Callers
//=========================================================================================

/// Who is making a request.
///
/// `Anonymous` is a fingerprint of the network origin and the client's user-agent string.
/// It is a best-effort session proxy for quota counting, not a security boundary: two
/// clients behind one proxy share it and one client can trivially change it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identity {
    Authenticated(String),
    Anonymous(String),
}

impl Identity {
    /// Stable key used for quota counters and document ownership.
    pub fn key(&self) -> String {
        match self {
            Self::Authenticated(user_id) => format!("user:{user_id}"),
            Self::Anonymous(fingerprint) => format!("anon:{fingerprint}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub identity: Identity,
    pub tier: Tier,
}

impl Caller {
    pub fn new(identity: Identity, tier: Tier) -> Self {
        Self { identity, tier }
    }
}

//=========================================================================================
// The Ledger
//=========================================================================================

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub allowed: bool,
    /// `None` when the limit is unlimited.
    pub remaining: Option<u64>,
    pub limit: Limit,
    pub used: u64,
}

/// Builds the counter key for `(identity, feature, day)`.
pub fn usage_key(identity: &Identity, feature: &str, day: NaiveDate) -> String {
    format!("{}:{}:{}", identity.key(), feature, day.format("%Y-%m-%d"))
}

pub struct EntitlementLedger {
    counter: Arc<dyn UsageCounter>,
    calendar: Arc<dyn Calendar>,
    limits: TierLimits,
}

impl EntitlementLedger {
    pub fn new(counter: Arc<dyn UsageCounter>) -> Self {
        Self::with_calendar(counter, Arc::new(SystemCalendar))
    }

    pub fn with_calendar(counter: Arc<dyn UsageCounter>, calendar: Arc<dyn Calendar>) -> Self {
        Self {
            counter,
            calendar,
            limits: TierLimits,
        }
    }

    pub fn limits(&self) -> &TierLimits {
        &self.limits
    }

    /// Reports the caller's standing for `feature` today without consuming anything.
    pub async fn check(&self, caller: &Caller, feature: Feature) -> PortResult<Admission> {
        self.check_by_name(caller, feature.as_str()).await
    }

    /// Like [`check`](Self::check) for a feature given by name; unknown names are denied.
    pub async fn check_by_name(&self, caller: &Caller, feature: &str) -> PortResult<Admission> {
        let limit = self.limits.limit_by_name(caller.tier, feature);
        let key = usage_key(&caller.identity, feature, self.calendar.today());
        let used = self.counter.get(&key).await?;
        Ok(evaluate(limit, used))
    }

    /// Checks the quota and, when allowed, records one use before returning.
    ///
    /// The check and the increment are one conditional step on the counter, against a
    /// single day's key, so concurrent requests cannot overshoot the limit.
    pub async fn admit(&self, caller: &Caller, feature: Feature) -> PortResult<Admission> {
        let limit = self.limits.limit(caller.tier, feature);
        let key = usage_key(&caller.identity, feature.as_str(), self.calendar.today());

        let counted = match limit {
            Limit::Unlimited => Some(self.counter.increment(&key).await?),
            Limit::Finite(max) => self.counter.increment_below(&key, max).await?,
        };

        match counted {
            Some(used) => {
                info!(identity = %caller.identity.key(), %feature, used, "Admitted gated request");
                Ok(evaluate(limit, used.saturating_sub(1)))
            }
            None => {
                let used = self.counter.get(&key).await?;
                warn!(
                    identity = %caller.identity.key(),
                    tier = %caller.tier,
                    %feature,
                    %limit,
                    "Daily limit reached"
                );
                Ok(Admission {
                    allowed: false,
                    ..evaluate(limit, used)
                })
            }
        }
    }
}

fn evaluate(limit: Limit, used: u64) -> Admission {
    match limit {
        Limit::Unlimited => Admission {
            allowed: true,
            remaining: None,
            limit,
            used,
        },
        Limit::Finite(max) => Admission {
            allowed: used < max,
            remaining: Some(max.saturating_sub(used)),
            limit,
            used,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Moves to the next day every time it is read.
    struct TickingCalendar(Mutex<NaiveDate>);

    impl Calendar for TickingCalendar {
        fn today(&self) -> NaiveDate {
            let mut day = self.0.lock().unwrap();
            let today = *day;
            *day = today.succ_opt().unwrap();
            today
        }
    }

    #[derive(Default)]
    struct RecordingCounter {
        counts: Mutex<HashMap<String, u64>>,
        touched: Mutex<Vec<String>>,
    }

    impl RecordingCounter {
        fn touch(&self, key: &str) {
            self.touched.lock().unwrap().push(key.to_string());
        }
    }

    #[async_trait]
    impl UsageCounter for RecordingCounter {
        async fn get(&self, key: &str) -> PortResult<u64> {
            self.touch(key);
            Ok(self.counts.lock().unwrap().get(key).copied().unwrap_or(0))
        }

        async fn increment(&self, key: &str) -> PortResult<u64> {
            self.touch(key);
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(key.to_string()).or_insert(0);
            *count += 1;
            Ok(*count)
        }

        async fn increment_below(&self, key: &str, cap: u64) -> PortResult<Option<u64>> {
            self.touch(key);
            let mut counts = self.counts.lock().unwrap();
            let count = counts.entry(key.to_string()).or_insert(0);
            if *count >= cap {
                return Ok(None);
            }
            *count += 1;
            Ok(Some(*count))
        }
    }

    fn ledger_across_midnight(counter: Arc<RecordingCounter>) -> EntitlementLedger {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        EntitlementLedger::with_calendar(counter, Arc::new(TickingCalendar(Mutex::new(start))))
    }

    #[tokio::test]
    async fn one_admission_reads_and_writes_a_single_day() {
        let counter = Arc::new(RecordingCounter::default());
        let ledger = ledger_across_midnight(counter.clone());
        let caller = Caller::new(Identity::Authenticated("u1".into()), Tier::Free);

        let admission = ledger.admit(&caller, Feature::NoteGenerations).await.unwrap();
        assert!(admission.allowed);
        assert_eq!(admission.used, 0);
        assert_eq!(admission.remaining, Some(1));

        let touched = counter.touched.lock().unwrap().clone();
        assert!(!touched.is_empty());
        assert!(touched.iter().all(|key| key == &touched[0]));
        assert!(touched[0].ends_with("2026-03-02"));
    }

    #[tokio::test]
    async fn denied_admission_touches_only_the_checked_day() {
        let counter = Arc::new(RecordingCounter::default());
        counter
            .counts
            .lock()
            .unwrap()
            .insert("user:u1:note_generations:2026-03-02".to_string(), 1);
        let ledger = ledger_across_midnight(counter.clone());
        let caller = Caller::new(Identity::Authenticated("u1".into()), Tier::Free);

        let admission = ledger.admit(&caller, Feature::NoteGenerations).await.unwrap();
        assert!(!admission.allowed);
        assert_eq!(admission.used, 1);
        assert_eq!(admission.remaining, Some(0));

        let touched = counter.touched.lock().unwrap().clone();
        assert!(touched.iter().all(|key| key == "user:u1:note_generations:2026-03-02"));
        assert_eq!(counter.counts.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn concurrent_admissions_never_exceed_the_limit() {
        let counter = Arc::new(RecordingCounter::default());
        let ledger = Arc::new(EntitlementLedger::with_calendar(
            counter,
            Arc::new(crate::ports::SystemCalendar),
        ));
        let caller = Caller::new(Identity::Anonymous("f00d".into()), Tier::Free);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let ledger = ledger.clone();
            let caller = caller.clone();
            handles.push(tokio::spawn(async move {
                ledger.admit(&caller, Feature::Flashcards).await.unwrap().allowed
            }));
        }
        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 3);
    }

    #[test]
    fn unknown_tiers_normalise_to_free() {
        assert_eq!(Tier::normalize(Some("PRO")), Tier::Pro);
        assert_eq!(Tier::normalize(Some("platinum")), Tier::Free);
        assert_eq!(Tier::normalize(None), Tier::Free);
    }

    #[test]
    fn unknown_feature_names_are_denied() {
        let limits = TierLimits;
        assert_eq!(
            limits.limit_by_name(Tier::Ultra, "teleportation"),
            Limit::Finite(0)
        );
        assert_eq!(
            limits.limit_by_name(Tier::Free, "flashcards"),
            Limit::Finite(3)
        );
    }

    #[test]
    fn every_feature_has_a_limit_on_every_tier() {
        for tier in [Tier::Free, Tier::Pro, Tier::Ultra] {
            for feature in Feature::ALL {
                let _ = TierLimits.limit(tier, feature);
                assert_eq!(feature.as_str().parse::<Feature>(), Ok(feature));
            }
        }
    }

    #[test]
    fn evaluate_reports_remaining() {
        let admission = evaluate(Limit::Finite(3), 1);
        assert!(admission.allowed);
        assert_eq!(admission.remaining, Some(2));

        let exhausted = evaluate(Limit::Finite(3), 5);
        assert!(!exhausted.allowed);
        assert_eq!(exhausted.remaining, Some(0));

        let unlimited = evaluate(Limit::Unlimited, 10_000);
        assert!(unlimited.allowed);
        assert_eq!(unlimited.remaining, None);
    }

    #[test]
    fn limit_serialises_unlimited_sentinel() {
        assert_eq!(serde_json::to_string(&Limit::Unlimited).unwrap(), "\"Unlimited\"");
        assert_eq!(serde_json::to_string(&Limit::Finite(2)).unwrap(), "2");
    }

    #[test]
    fn keys_differ_by_day() {
        let id = Identity::Authenticated("u1".into());
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = monday.succ_opt().unwrap();
        assert_eq!(usage_key(&id, "tests", monday), "user:u1:tests:2026-03-02");
        assert_ne!(usage_key(&id, "tests", monday), usage_key(&id, "tests", tuesday));
    }
}
