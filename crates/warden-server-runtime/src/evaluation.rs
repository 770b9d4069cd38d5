// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::io::Cursor;

use chrono::{DateTime, Utc};
use murmur3::murmur3_32;

use warden_runtime_core::{Decision, EvaluationContext, FlagRecord};

/// Evaluates one flag key against a caller context.
///
/// The evaluation order is:
/// 1. Filter `records` to this key, then select the most specific
///    applicable record (user > organization > global)
/// 2. No applicable record: not configured
/// 3. Kill switch wins over everything else
/// 4. Schedule window (inclusive bounds)
/// 5. Disabled record: not configured, with the record's scope attached
/// 6. Percentage rollout via consistent hashing
/// 7. Enabled, with a deterministically selected variant
pub fn evaluate_feature_decision(
	flag_key: &str,
	records: &[FlagRecord],
	context: &EvaluationContext,
) -> Decision {
	evaluate_feature_decision_at(flag_key, records, context, Utc::now())
}

/// Same as [`evaluate_feature_decision`] with an explicit clock, so schedule
/// windows can be tested without sleeping.
pub fn evaluate_feature_decision_at(
	flag_key: &str,
	records: &[FlagRecord],
	context: &EvaluationContext,
	now: DateTime<Utc>,
) -> Decision {
	let record = match select_applicable(flag_key, records, context) {
		Some(record) => record,
		None => return Decision::not_configured(),
	};

	let scope_type = record.scope.scope_type();

	if record.kill_switch {
		return Decision::killed(scope_type);
	}

	if !record.is_live_at(now) {
		return Decision::outside_schedule(scope_type);
	}

	if !record.enabled {
		return Decision::disabled(scope_type);
	}

	if record.rollout_percentage < 100
		&& !evaluate_percentage(
			context.bucketing_identity(),
			flag_key,
			record.rollout_percentage,
		) {
		return Decision::outside_rollout(scope_type);
	}

	Decision::enabled(scope_type, resolve_variant(flag_key, record, context))
}

/// Picks the record for this key whose scope matches the context most
/// specifically.
///
/// At most one record exists per (key, scope target), so specificity alone
/// decides the winner; on duplicates the first per tier wins.
fn select_applicable<'a>(
	flag_key: &str,
	records: &'a [FlagRecord],
	context: &EvaluationContext,
) -> Option<&'a FlagRecord> {
	records
		.iter()
		.filter(|record| record.key == flag_key && record.scope.applies_to(context))
		.min_by_key(|record| record.scope.priority())
}

/// Evaluates percentage-based targeting using consistent hashing.
fn evaluate_percentage(key: &str, flag_key: &str, percentage: u32) -> bool {
	let input = format!("{}.{}", flag_key, key);
	let hash = murmur3_32(&mut Cursor::new(input.as_bytes()), 0).unwrap_or(0);
	let bucket = hash % 100;
	bucket < percentage
}

/// Selects a variant name based on weights (for multi-variant experiments).
///
/// The hash input carries a `.variant` suffix so the variant split is not
/// correlated with the rollout bucket. A weight of `w` out of total `T` wins
/// for exactly `w/T` of the identifier space.
fn resolve_variant(
	flag_key: &str,
	record: &FlagRecord,
	context: &EvaluationContext,
) -> Option<String> {
	if record.variants.is_empty() {
		if record.default_variant.is_empty() {
			return None;
		}
		return Some(record.default_variant.clone());
	}

	let total_weight: u32 = record.variants.iter().map(|v| v.weight).sum();
	if total_weight == 0 {
		return Some(record.default_variant.clone());
	}

	let input = format!("{}.{}.variant", flag_key, context.bucketing_identity());
	let hash = murmur3_32(&mut Cursor::new(input.as_bytes()), 0).unwrap_or(0);

	let bucket = hash % total_weight;
	let mut cumulative = 0u32;

	for variant in &record.variants {
		cumulative += variant.weight;
		if bucket < cumulative {
			return Some(variant.name.clone());
		}
	}

	Some(record.default_variant.clone())
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;
	use warden_runtime_core::{FlagScope, ReasonCode, ScopeType, Variant};

	fn global_record(key: &str) -> FlagRecord {
		FlagRecord::new(key, FlagScope::Global)
	}

	fn org_record(key: &str, org_id: &str) -> FlagRecord {
		FlagRecord::new(key, FlagScope::Organization(org_id.to_string()))
	}

	fn user_record(key: &str, user_id: &str) -> FlagRecord {
		FlagRecord::new(key, FlagScope::User(user_id.to_string()))
	}

	fn user_context(user_id: &str) -> EvaluationContext {
		EvaluationContext::new().with_user_id(user_id)
	}

	#[test]
	fn test_empty_records_not_configured() {
		let decision = evaluate_feature_decision("checkout.v2", &[], &user_context("user123"));

		assert!(!decision.enabled);
		assert_eq!(decision.reason, ReasonCode::NotConfigured);
		assert_eq!(decision.scope_type, None);
		assert_eq!(decision.variant, None);
	}

	#[test]
	fn test_enabled_global_record() {
		let records = vec![global_record("checkout.v2")];
		let decision = evaluate_feature_decision("checkout.v2", &records, &user_context("user123"));

		assert!(decision.enabled);
		assert_eq!(decision.reason, ReasonCode::Ok);
		assert_eq!(decision.scope_type, Some(ScopeType::Global));
	}

	#[test]
	fn test_records_for_other_keys_are_invisible() {
		let mut other = global_record("billing.v3");
		other.kill_switch = true;

		let decision = evaluate_feature_decision("checkout.v2", &[other], &user_context("user123"));
		assert_eq!(decision.reason, ReasonCode::NotConfigured);
		assert_eq!(decision.scope_type, None);
	}

	#[test]
	fn test_kill_switch_wins_over_enabled() {
		let mut record = global_record("checkout.v2");
		record.kill_switch = true;
		let decision = evaluate_feature_decision("checkout.v2", &[record], &user_context("user123"));

		assert!(!decision.enabled);
		assert_eq!(decision.reason, ReasonCode::KillSwitch);
		assert_eq!(decision.scope_type, Some(ScopeType::Global));
	}

	#[test]
	fn test_kill_switch_wins_over_schedule() {
		let mut record = global_record("checkout.v2");
		record.kill_switch = true;
		record.start_at = Some(Utc::now() + Duration::days(1));
		let decision = evaluate_feature_decision("checkout.v2", &[record], &user_context("user123"));

		assert_eq!(decision.reason, ReasonCode::KillSwitch);
	}

	#[test]
	fn test_disabled_record_keeps_scope() {
		let mut record = global_record("checkout.v2");
		record.enabled = false;
		let decision = evaluate_feature_decision("checkout.v2", &[record], &user_context("user123"));

		assert!(!decision.enabled);
		assert_eq!(decision.reason, ReasonCode::NotConfigured);
		// A disabled record is distinguishable from no record at all.
		assert_eq!(decision.scope_type, Some(ScopeType::Global));
	}

	#[test]
	fn test_schedule_checked_before_enabled() {
		let now = Utc::now();
		let mut record = global_record("checkout.v2");
		record.enabled = false;
		record.start_at = Some(now + Duration::hours(1));

		let decision =
			evaluate_feature_decision_at("checkout.v2", &[record], &user_context("user123"), now);
		assert_eq!(decision.reason, ReasonCode::OutsideSchedule);
	}

	#[test]
	fn test_user_scope_beats_org_and_global() {
		let mut global = global_record("checkout.v2");
		global.enabled = false;
		let mut org = org_record("checkout.v2", "org-a");
		org.enabled = false;
		let user = user_record("checkout.v2", "user123");

		let context = user_context("user123").with_org_id("org-a");
		let decision = evaluate_feature_decision("checkout.v2", &[global, org, user], &context);

		assert!(decision.enabled);
		assert_eq!(decision.scope_type, Some(ScopeType::User));
	}

	#[test]
	fn test_org_scope_beats_global() {
		let global = global_record("checkout.v2");
		let mut org = org_record("checkout.v2", "org-a");
		org.kill_switch = true;

		let context = user_context("user123").with_org_id("org-a");
		let decision = evaluate_feature_decision("checkout.v2", &[global, org], &context);

		assert_eq!(decision.reason, ReasonCode::KillSwitch);
		assert_eq!(decision.scope_type, Some(ScopeType::Organization));
	}

	#[test]
	fn test_mismatched_scope_falls_through() {
		let global = global_record("checkout.v2");
		let mut org = org_record("checkout.v2", "org-b");
		org.kill_switch = true;

		let context = user_context("user123").with_org_id("org-a");
		let decision = evaluate_feature_decision("checkout.v2", &[global, org], &context);

		// org-b's record does not apply to org-a.
		assert!(decision.enabled);
		assert_eq!(decision.scope_type, Some(ScopeType::Global));
	}

	#[test]
	fn test_schedule_before_start() {
		let now = Utc::now();
		let mut record = global_record("checkout.v2");
		record.start_at = Some(now + Duration::hours(1));

		let decision =
			evaluate_feature_decision_at("checkout.v2", &[record], &user_context("user123"), now);
		assert_eq!(decision.reason, ReasonCode::OutsideSchedule);
		assert_eq!(decision.scope_type, Some(ScopeType::Global));
	}

	#[test]
	fn test_schedule_after_end() {
		let now = Utc::now();
		let mut record = global_record("checkout.v2");
		record.end_at = Some(now - Duration::hours(1));

		let decision =
			evaluate_feature_decision_at("checkout.v2", &[record], &user_context("user123"), now);
		assert_eq!(decision.reason, ReasonCode::OutsideSchedule);
	}

	#[test]
	fn test_schedule_bounds_inclusive() {
		let now = Utc::now();
		let mut record = global_record("checkout.v2");
		record.start_at = Some(now);
		record.end_at = Some(now);

		let decision =
			evaluate_feature_decision_at("checkout.v2", &[record], &user_context("user123"), now);
		assert_eq!(decision.reason, ReasonCode::Ok);
	}

	#[test]
	fn test_zero_rollout_excludes_everyone() {
		let mut record = global_record("checkout.v2");
		record.rollout_percentage = 0;

		for i in 0..100 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			assert_eq!(decision.reason, ReasonCode::OutsideRollout);
		}
	}

	#[test]
	fn test_full_rollout_includes_everyone() {
		let record = global_record("checkout.v2");

		for i in 0..100 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			assert_eq!(decision.reason, ReasonCode::Ok);
		}
	}

	#[test]
	fn test_partial_rollout_is_consistent() {
		// The same identity always lands in the same bucket
		let result1 = evaluate_percentage("user123", "checkout.v2", 50);
		let result2 = evaluate_percentage("user123", "checkout.v2", 50);
		assert_eq!(result1, result2);

		// Different identities spread across buckets
		let results: Vec<bool> = (0..100)
			.map(|i| evaluate_percentage(&format!("user{}", i), "checkout.v2", 50))
			.collect();

		let true_count = results.iter().filter(|&&r| r).count();
		// Should be roughly 50% (with some tolerance)
		assert!(true_count > 30 && true_count < 70);
	}

	#[test]
	fn test_anonymous_callers_share_one_bucket() {
		let mut record = global_record("checkout.v2");
		record.rollout_percentage = 50;
		let records = vec![record];

		let anonymous =
			evaluate_feature_decision("checkout.v2", &records, &EvaluationContext::new());
		let named_anonymous =
			evaluate_feature_decision("checkout.v2", &records, &user_context("anonymous"));

		assert_eq!(anonymous, named_anonymous);
	}

	#[test]
	fn test_org_identity_used_when_no_user() {
		let mut record = global_record("checkout.v2");
		record.rollout_percentage = 50;
		let records = vec![record];

		let by_org = evaluate_feature_decision(
			"checkout.v2",
			&records,
			&EvaluationContext::new().with_org_id("org-a"),
		);
		let expected = evaluate_percentage("org-a", "checkout.v2", 50);

		assert_eq!(by_org.enabled, expected);
	}

	#[test]
	fn test_variant_selected_from_weights() {
		let mut record = global_record("checkout.v2");
		record.variants = vec![
			Variant {
				name: "control".to_string(),
				weight: 1,
			},
			Variant {
				name: "treatment".to_string(),
				weight: 0,
			},
		];
		record.default_variant = "control".to_string();

		// Total weight 1: every bucket selects the only weighted variant.
		for i in 0..50 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			assert_eq!(decision.variant.as_deref(), Some("control"));
		}
	}

	#[test]
	fn test_variant_split_reaches_both_arms() {
		let mut record = global_record("checkout.v2");
		record.variants = vec![
			Variant {
				name: "control".to_string(),
				weight: 50,
			},
			Variant {
				name: "treatment".to_string(),
				weight: 50,
			},
		];
		record.default_variant = "control".to_string();

		let mut control = 0;
		let mut treatment = 0;
		for i in 0..100 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			match decision.variant.as_deref() {
				Some("control") => control += 1,
				Some("treatment") => treatment += 1,
				other => panic!("unexpected variant {:?}", other),
			}
		}

		assert!(control > 0);
		assert!(treatment > 0);
		assert_eq!(control + treatment, 100);
	}

	#[test]
	fn test_variant_weights_need_not_sum_to_100() {
		let mut record = global_record("checkout.v2");
		record.variants = vec![
			Variant {
				name: "a".to_string(),
				weight: 1,
			},
			Variant {
				name: "b".to_string(),
				weight: 2,
			},
		];
		record.default_variant = "a".to_string();

		// Total weight 3; every identity still gets exactly one arm.
		for i in 0..50 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			assert!(matches!(decision.variant.as_deref(), Some("a") | Some("b")));
		}
	}

	#[test]
	fn test_variant_zero_total_uses_default() {
		let mut record = global_record("checkout.v2");
		record.variants = vec![
			Variant {
				name: "control".to_string(),
				weight: 0,
			},
			Variant {
				name: "treatment".to_string(),
				weight: 0,
			},
		];
		record.default_variant = "treatment".to_string();

		let decision = evaluate_feature_decision("checkout.v2", &[record], &user_context("user123"));
		assert_eq!(decision.variant.as_deref(), Some("treatment"));
	}

	#[test]
	fn test_no_variants_no_variant_name() {
		let records = vec![global_record("checkout.v2")];
		let decision = evaluate_feature_decision("checkout.v2", &records, &user_context("user123"));

		assert!(decision.enabled);
		assert_eq!(decision.variant, None);
	}

	#[test]
	fn test_no_variants_with_default_name() {
		let mut record = global_record("checkout.v2");
		record.default_variant = "on".to_string();

		let decision = evaluate_feature_decision("checkout.v2", &[record], &user_context("user123"));
		assert_eq!(decision.variant.as_deref(), Some("on"));
	}

	#[test]
	fn test_variant_split_decorrelated_from_rollout() {
		// The `.variant` suffix keeps arm selection independent from the
		// rollout bucket, so a 50% rollout does not force everyone inside
		// it into the same arm.
		let mut record = global_record("checkout.v2");
		record.rollout_percentage = 50;
		record.variants = vec![
			Variant {
				name: "control".to_string(),
				weight: 50,
			},
			Variant {
				name: "treatment".to_string(),
				weight: 50,
			},
		];
		record.default_variant = "control".to_string();

		let mut arms = std::collections::HashSet::new();
		for i in 0..200 {
			let decision = evaluate_feature_decision(
				"checkout.v2",
				std::slice::from_ref(&record),
				&user_context(&format!("user{}", i)),
			);
			if let Some(variant) = decision.variant {
				arms.insert(variant);
			}
		}

		assert_eq!(arms.len(), 2);
	}
}

#[cfg(test)]
mod proptest_tests {
	use super::*;
	use proptest::prelude::*;
	use warden_runtime_core::FlagScope;

	proptest! {
		#[test]
		fn percentage_is_deterministic(user_id in "[a-zA-Z0-9]{1,50}", flag_key in "[a-z][a-z0-9_.]{2,49}", pct in 0u32..=100) {
			// Same inputs should always produce the same result
			let result1 = evaluate_percentage(&user_id, &flag_key, pct);
			let result2 = evaluate_percentage(&user_id, &flag_key, pct);
			prop_assert_eq!(result1, result2);
		}

		#[test]
		fn percentage_monotonic(user_id in "[a-zA-Z0-9]{1,50}", flag_key in "[a-z][a-z0-9_.]{2,49}") {
			// If an identity is included at percentage P, it stays included
			// for every percentage above P
			let mut included_at: Option<u32> = None;
			for pct in 0..=100 {
				if evaluate_percentage(&user_id, &flag_key, pct) {
					included_at = Some(pct);
					break;
				}
			}

			if let Some(threshold) = included_at {
				for pct in threshold..=100 {
					prop_assert!(evaluate_percentage(&user_id, &flag_key, pct),
						"identity should be included at {}% but wasn't (threshold was {}%)", pct, threshold);
				}
			}
		}

		#[test]
		fn percentage_zero_never_includes(user_id in "[a-zA-Z0-9]{1,50}", flag_key in "[a-z][a-z0-9_.]{2,49}") {
			prop_assert!(!evaluate_percentage(&user_id, &flag_key, 0));
		}

		#[test]
		fn percentage_hundred_always_includes(user_id in "[a-zA-Z0-9]{1,50}", flag_key in "[a-z][a-z0-9_.]{2,49}") {
			prop_assert!(evaluate_percentage(&user_id, &flag_key, 100));
		}

		#[test]
		fn decision_is_deterministic(user_id in "[a-zA-Z0-9]{1,50}", pct in 0u32..=100) {
			let mut record = FlagRecord::new("prop.feature", FlagScope::Global);
			record.rollout_percentage = pct;
			let context = EvaluationContext::new().with_user_id(user_id);
			let now = Utc::now();

			let first = evaluate_feature_decision_at(
				"prop.feature",
				std::slice::from_ref(&record),
				&context,
				now,
			);
			let second = evaluate_feature_decision_at(
				"prop.feature",
				std::slice::from_ref(&record),
				&context,
				now,
			);
			prop_assert_eq!(first, second);
		}

		#[test]
		fn decision_never_panics_on_arbitrary_context(
			user_id in proptest::option::of("[a-zA-Z0-9_.@-]{0,64}"),
			org_id in proptest::option::of("[a-zA-Z0-9_-]{0,32}"),
			pct in 0u32..=100,
		) {
			let mut record = FlagRecord::new("prop.feature", FlagScope::Global);
			record.rollout_percentage = pct;

			let mut context = EvaluationContext::new();
			if let Some(user_id) = user_id {
				context = context.with_user_id(user_id);
			}
			if let Some(org_id) = org_id {
				context = context.with_org_id(org_id);
			}

			let decision =
				evaluate_feature_decision("prop.feature", std::slice::from_ref(&record), &context);
			prop_assert!(decision.scope_type.is_some());
		}
	}
}
