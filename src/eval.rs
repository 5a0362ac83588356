use chrono::Utc;

use crate::{
    rules::matches_any,
    sharder::{range_contains, shard_index_with, Sharder},
    ufc::{Allocation, Flag, Shard, Split, Timestamp},
    AssignmentEvent, AssignmentValue, Attributes, Error, Result, SdkMetadata,
};

/// Result of assignment evaluation.
#[derive(Debug, Clone)]
pub struct Assignment {
    /// Assignment value that should be returned to the user.
    pub value: AssignmentValue,
    /// Key of the allocation that matched.
    pub allocation_key: String,
    /// Key of the assigned variation.
    pub variation_key: String,
    /// Assignment event that should be logged, if the allocation asks for logging.
    pub event: Option<AssignmentEvent>,
}

impl Flag {
    /// Evaluate the flag for a subject at the current time.
    pub fn eval(
        &self,
        subject_key: &str,
        subject_attributes: &Attributes,
        sharder: &impl Sharder,
        sdk_metadata: &SdkMetadata,
    ) -> Result<Option<Assignment>> {
        self.eval_at(
            subject_key,
            subject_attributes,
            sharder,
            sdk_metadata,
            Utc::now(),
        )
    }

    /// Evaluate the flag for a subject at `now`.
    ///
    /// Returns `Ok(None)` if the flag is disabled or no allocation/split applies to the subject.
    pub fn eval_at(
        &self,
        subject_key: &str,
        subject_attributes: &Attributes,
        sharder: &impl Sharder,
        sdk_metadata: &SdkMetadata,
        now: Timestamp,
    ) -> Result<Option<Assignment>> {
        if !self.enabled {
            return Ok(None);
        }

        if self.total_shards == 0 {
            log::warn!(target: "eppo", flag_key:display = self.key; "flag has zero total shards");
            return Err(Error::ConfigurationParseError);
        }

        // Augmenting subject_attributes with id, so that subject_key can be used in the rules.
        let augmented_subject_attributes = {
            let mut sa = subject_attributes.clone();
            sa.entry("id".into()).or_insert_with(|| subject_key.into());
            sa
        };

        let mut matched = None;
        for allocation in &self.allocations {
            if let Some(split) = allocation.get_matching_split(
                subject_key,
                &augmented_subject_attributes,
                sharder,
                self.total_shards,
                now,
            )? {
                matched = Some((allocation, split));
                break;
            }
        }
        let Some((allocation, split)) = matched else {
            return Ok(None);
        };

        let variation = self.variations.get(&split.variation_key).ok_or_else(|| {
            log::warn!(target: "eppo",
                       flag_key:display = self.key,
                       subject_key,
                       variation_key:display = split.variation_key;
                       "internal: unable to find variation");
            Error::VariationNotFound {
                flag_key: self.key.clone(),
                variation_key: split.variation_key.clone(),
            }
        })?;

        let value = variation
            .value
            .to_assignment_value(self.variation_type)
            .ok_or_else(|| {
                log::warn!(target: "eppo",
                           flag_key:display = self.key,
                           subject_key,
                           variation_key:display = split.variation_key;
                           "internal: unable to convert Value to AssignmentValue");
                Error::TypeConversionFailure {
                    flag_key: self.key.clone(),
                    variation_type: self.variation_type,
                }
            })?;

        let event = allocation.do_log.then(|| AssignmentEvent {
            feature_flag: self.key.clone(),
            allocation: allocation.key.clone(),
            experiment: format!("{}-{}", self.key, allocation.key),
            variation: variation.key.clone(),
            subject: subject_key.to_owned(),
            subject_attributes: subject_attributes.clone(),
            timestamp: now.to_rfc3339(),
            meta_data: sdk_metadata.as_meta_data(),
            extra_logging: split.extra_logging.clone(),
        });

        Ok(Some(Assignment {
            value,
            allocation_key: allocation.key.clone(),
            variation_key: variation.key.clone(),
            event,
        }))
    }
}

impl Allocation {
    fn get_matching_split(
        &self,
        subject_key: &str,
        augmented_subject_attributes: &Attributes,
        sharder: &impl Sharder,
        total_shards: u64,
        now: Timestamp,
    ) -> Result<Option<&Split>> {
        if !self.is_allowed_by_time(now) || !self.is_allowed_by_rules(augmented_subject_attributes)? {
            return Ok(None);
        }
        Ok(self
            .splits
            .iter()
            .find(|split| split.matches(subject_key, sharder, total_shards)))
    }

    /// The validity window is `[start_at, end_at)`.
    fn is_allowed_by_time(&self, now: Timestamp) -> bool {
        let forbidden = matches!(self.start_at, Some(t) if now < t)
            || matches!(self.end_at, Some(t) if now >= t);
        !forbidden
    }

    fn is_allowed_by_rules(&self, augmented_subject_attributes: &Attributes) -> Result<bool> {
        if self.rules.is_empty() {
            return Ok(true);
        }
        matches_any(augmented_subject_attributes, &self.rules)
    }
}

impl Split {
    /// Return `true` if `subject_key` matches the given split under the provided `sharder`.
    ///
    /// To match a split, subject must match all underlying shards.
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        self.shards
            .iter()
            .all(|shard| shard.matches(subject_key, sharder, total_shards))
    }
}

impl Shard {
    fn matches(&self, subject_key: &str, sharder: &impl Sharder, total_shards: u64) -> bool {
        let index = shard_index_with(sharder, subject_key, &self.salt, total_shards);
        range_contains(index, &self.ranges)
    }
}
