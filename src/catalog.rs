use std::{collections::BTreeMap, str::FromStr};

use crate::{
    config::{App, ConfigError, IndexSetting, SourceSetting},
    declare::{LogicalIndex, SourceKind},
    scheduler::guard::{ScheduleSlot, WORKING_DAYS},
    util::datetime,
};

/// Everything the bot knows about one index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexProfile {
    pub index: LogicalIndex,
    pub label: String,
    pub pin: bool,
    pub slot: ScheduleSlot,
    /// Fallback order, first source tried first.
    pub sources: Vec<SourceSetting>,
}

/// The validated set of indices, built once at startup.
#[derive(Debug, Clone, Default)]
pub struct IndexCatalog {
    profiles: BTreeMap<LogicalIndex, IndexProfile>,
}

impl IndexCatalog {
    pub fn from_app(app: &App) -> Result<Self, ConfigError> {
        let cutoff = app.system.rollover_cutoff_hour;
        let mut profiles = BTreeMap::new();

        if app.indices.is_empty() {
            for index in LogicalIndex::iterator() {
                let profile = built_in_profile(index, cutoff)?;
                profiles.insert(index, profile);
            }
        } else {
            for setting in &app.indices {
                let profile = profile_from_setting(setting, cutoff)?;
                if profiles.contains_key(&profile.index) {
                    return Err(ConfigError::DuplicateIndex(profile.index));
                }
                profiles.insert(profile.index, profile);
            }
        }

        for profile in profiles.values_mut() {
            if let Some(url) = app.endpoints.page_for(profile.index) {
                let page = SourceSetting {
                    kind: SourceKind::Scrape,
                    symbol: url.to_string(),
                    selector: None,
                };
                if !profile.sources.contains(&page) {
                    profile.sources.push(page);
                }
            }

            validate_sources(profile, &app.endpoints.time_series_api_key)?;
        }

        Ok(IndexCatalog { profiles })
    }

    pub fn get(&self, index: LogicalIndex) -> Option<&IndexProfile> {
        self.profiles.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexProfile> {
        self.profiles.values()
    }

    pub fn slots(&self) -> Vec<ScheduleSlot> {
        self.profiles.values().map(|p| p.slot.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

fn built_in_profile(index: LogicalIndex, cutoff: u32) -> Result<IndexProfile, ConfigError> {
    Ok(IndexProfile {
        index,
        label: index.label().to_string(),
        pin: true,
        slot: ScheduleSlot {
            index,
            time: parse_time(index, index.default_slot())?,
            weekdays: WORKING_DAYS.to_vec(),
            rollover: index.default_rollover(),
            cutoff_hour: cutoff,
        },
        sources: vec![
            SourceSetting {
                kind: SourceKind::QuoteApi,
                symbol: index.yahoo_symbol().to_string(),
                selector: None,
            },
            SourceSetting {
                kind: SourceKind::ChartApi,
                symbol: index.yahoo_symbol().to_string(),
                selector: None,
            },
        ],
    })
}

fn profile_from_setting(setting: &IndexSetting, cutoff: u32) -> Result<IndexProfile, ConfigError> {
    let index = LogicalIndex::from_str(&setting.index)?;
    let mut profile = built_in_profile(index, cutoff)?;

    if let Some(label) = setting.label.as_ref().filter(|l| !l.trim().is_empty()) {
        profile.label = label.trim().to_string();
    }

    if let Some(pin) = setting.pin {
        profile.pin = pin;
    }

    if let Some(time) = &setting.time {
        profile.slot.time = parse_time(index, time)?;
    }

    if let Some(rollover) = setting.rollover {
        profile.slot.rollover = rollover;
    }

    if let Some(weekdays) = &setting.weekdays {
        let mut days = Vec::with_capacity(weekdays.len());
        for value in weekdays {
            let day = datetime::parse_weekday(value).map_err(|_| ConfigError::UnknownWeekday {
                index,
                value: value.clone(),
            })?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        profile.slot.weekdays = days;
    }

    if !setting.sources.is_empty() {
        profile.sources = setting.sources.clone();
    }

    Ok(profile)
}

fn parse_time(index: LogicalIndex, value: &str) -> Result<chrono::NaiveTime, ConfigError> {
    datetime::parse_slot_time(value).map_err(|_| ConfigError::BadSlotTime {
        index,
        value: value.to_string(),
    })
}

fn validate_sources(profile: &IndexProfile, api_key: &str) -> Result<(), ConfigError> {
    if profile.sources.is_empty() {
        return Err(ConfigError::EmptySources(profile.index));
    }

    for source in &profile.sources {
        match source.kind {
            SourceKind::Scrape if source.symbol.trim().is_empty() => {
                return Err(ConfigError::MissingPageUrl(profile.index));
            }
            SourceKind::TimeSeriesLatest if api_key.trim().is_empty() => {
                return Err(ConfigError::MissingApiKey(profile.index));
            }
            SourceKind::QuoteApi | SourceKind::ChartApi | SourceKind::TimeSeriesLatest
                if source.symbol.trim().is_empty() =>
            {
                return Err(ConfigError::EmptySources(profile.index));
            }
            _ => {}
        }
    }

    Ok(())
}
