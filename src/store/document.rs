//! # Persisted Document
//!
//! The whole persisted state is one JSON document:
//!
//! ```json
//! {
//!   "dataVersion": 2,
//!   "appInfos": [{ "packageName": "...", "lastLaunched": 0, "launchedCount": [0, ...] }],
//!   "widgetSettings": { "0": { "widgetId": 0, "sortAppBy": "Count", ... } },
//!   "isProMode": false,
//!   "homeLauncherPackageName": ""
//! }
//! ```
//!
//! Widget id `0` is the global default configuration. Every lookup for a
//! widget without its own entry falls back to it.

use crate::usage::AppUsageRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Schema version written by this build
pub const CURRENT_DATA_VERSION: i32 = 2;

/// Widget id holding the global default configuration
pub const DEFAULT_WIDGET_ID: i32 = 0;

pub(crate) const COLOR_BLACK: i32 = 0xFF00_0000_u32 as i32;
pub(crate) const COLOR_WHITE: i32 = 0xFFFF_FFFF_u32 as i32;

/// Which ranking strategy a widget uses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortMode {
    /// Total launch count
    #[default]
    Count,
    /// Foreground duration over the trailing 30 days
    Period,
    /// Time-of-day weighted recommendation
    Recommend,
    /// Most recently launched first
    Recent,
}

/// How strongly the Recommend strategy favours raw launch counts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RecommendMode {
    #[default]
    Balanced,
    /// Time pattern only
    Time,
    /// Launch count rank weighs heaviest
    Count,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterMode {
    /// Show everything except the block set
    #[default]
    BlockList,
    /// Show only the allow set
    AllowList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortingDirection {
    #[default]
    LeftTop,
    RightTop,
    LeftBottom,
    RightBottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AppIconStyle {
    #[default]
    System,
    Circle,
    Square,
    RoundedSquare,
    Squircle,
}

/// Configuration of one widget instance.
///
/// Only the first block of fields drives ranking. The rest is presentation
/// state owned by the renderer; it is carried so documents round-trip intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetSettings {
    pub widget_id: i32,
    #[serde(rename = "sortAppBy")]
    pub sort_mode: SortMode,
    #[serde(rename = "recommendSortMode")]
    pub recommend_mode: RecommendMode,
    pub filter_mode: FilterMode,
    pub block_apps: BTreeSet<String>,
    pub allow_apps: BTreeSet<String>,
    pub sorting_direction: SortingDirection,
    pub pinned_apps: BTreeSet<String>,

    pub is_title_visible: bool,
    pub is_title_update_time_visible: bool,
    pub title_text: String,
    pub app_icon_style: AppIconStyle,
    pub app_icon_pack_package: String,
    pub is_force_icon_shape_clip: bool,
    pub app_icon_size: i32,

    pub is_advanced_widget_layout: bool,
    pub adv_lyt_is_hor_ver_icon_gap_separate: bool,
    pub adv_lyt_hor_icon_gap_size: i32,
    pub adv_lyt_ver_icon_gap_size: i32,
    pub adv_lyt_is_hor_ver_list_padding_separate: bool,
    pub adv_lyt_hor_list_padding_size: i32,
    pub adv_lyt_ver_list_padding_size: i32,

    pub is_show_apps_name: bool,
    pub apps_name_size: i32,
    pub apps_name_margin: i32,
    pub background_corner_radius: i32,
    pub is_set_dark_mode_color: bool,
    pub background_color: i32,
    pub background_dark_mode_color: i32,
    pub text_color: i32,
    pub text_dark_mode_color: i32,
}

impl Default for WidgetSettings {
    fn default() -> Self {
        Self::for_widget(DEFAULT_WIDGET_ID)
    }
}

impl WidgetSettings {
    /// Factory defaults for a widget
    pub fn for_widget(widget_id: i32) -> Self {
        Self {
            widget_id,
            sort_mode: SortMode::Count,
            recommend_mode: RecommendMode::Balanced,
            filter_mode: FilterMode::BlockList,
            block_apps: BTreeSet::new(),
            allow_apps: BTreeSet::new(),
            sorting_direction: SortingDirection::LeftTop,
            pinned_apps: BTreeSet::new(),

            is_title_visible: true,
            is_title_update_time_visible: true,
            title_text: "LaunchRank".to_string(),
            app_icon_style: AppIconStyle::System,
            app_icon_pack_package: String::new(),
            is_force_icon_shape_clip: false,
            app_icon_size: 45,

            is_advanced_widget_layout: false,
            adv_lyt_is_hor_ver_icon_gap_separate: false,
            adv_lyt_hor_icon_gap_size: 3,
            adv_lyt_ver_icon_gap_size: 3,
            adv_lyt_is_hor_ver_list_padding_separate: false,
            adv_lyt_hor_list_padding_size: 3,
            adv_lyt_ver_list_padding_size: 3,

            is_show_apps_name: false,
            apps_name_size: 12,
            apps_name_margin: 5,
            background_corner_radius: 11,
            is_set_dark_mode_color: false,
            background_color: COLOR_BLACK,
            background_dark_mode_color: COLOR_WHITE,
            text_color: COLOR_WHITE,
            text_dark_mode_color: COLOR_BLACK,
        }
    }

    /// The package set consulted by the current filter mode
    pub fn active_filter(&self) -> &BTreeSet<String> {
        match self.filter_mode {
            FilterMode::BlockList => &self.block_apps,
            FilterMode::AllowList => &self.allow_apps,
        }
    }

    /// Whether `package_name` passes this widget's allow/block filter
    pub fn admits(&self, package_name: &str) -> bool {
        let listed = self.active_filter().contains(package_name);
        match self.filter_mode {
            FilterMode::BlockList => !listed,
            FilterMode::AllowList => listed,
        }
    }
}

/// The single persisted document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreDocument {
    data_version: i32,
    pub app_infos: Vec<AppUsageRecord>,
    pub widget_settings: BTreeMap<i32, WidgetSettings>,
    pub is_pro_mode: bool,
    pub home_launcher_package_name: String,
}

impl Default for StoreDocument {
    fn default() -> Self {
        let mut widget_settings = BTreeMap::new();
        widget_settings.insert(
            DEFAULT_WIDGET_ID,
            WidgetSettings::for_widget(DEFAULT_WIDGET_ID),
        );
        Self {
            data_version: CURRENT_DATA_VERSION,
            app_infos: Vec::new(),
            widget_settings,
            is_pro_mode: false,
            home_launcher_package_name: String::new(),
        }
    }
}

impl StoreDocument {
    pub fn data_version(&self) -> i32 {
        self.data_version
    }

    pub(crate) fn set_data_version(&mut self, version: i32) {
        self.data_version = version;
    }

    /// Settings for `widget_id`, falling back to the global default
    pub fn widget_settings_for(&self, widget_id: i32) -> WidgetSettings {
        self.widget_settings
            .get(&widget_id)
            .or_else(|| self.widget_settings.get(&DEFAULT_WIDGET_ID))
            .cloned()
            .unwrap_or_default()
    }

    /// Make sure the global default configuration exists
    pub fn ensure_default_widget(&mut self) {
        self.widget_settings
            .entry(DEFAULT_WIDGET_ID)
            .or_insert_with(|| WidgetSettings::for_widget(DEFAULT_WIDGET_ID));
    }

    /// Shrink every bucket of every record by the retention law
    pub fn reduce_launched_counts(&mut self) {
        self.app_infos.iter_mut().for_each(AppUsageRecord::decay);
    }

    /// Look up the usage record for a package
    pub fn record(&self, package_name: &str) -> Option<&AppUsageRecord> {
        self.app_infos
            .iter()
            .find(|r| r.package_name == package_name)
    }
}
