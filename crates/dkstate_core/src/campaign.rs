use std::collections::BTreeMap;

/// Campaign resolution consumed by the continue-game checks.
pub trait Campaigns {
    /// Makes `fname` the active campaign. False when it cannot be resolved.
    fn change_campaign(&mut self, fname: &str) -> bool;

    /// True for levels of the active campaign that can be resumed as a
    /// single player game (regular, bonus and extra levels).
    fn is_singleplayer_like_level(&self, level: i32) -> bool;

    fn campaign_name(&self) -> Option<&str> {
        None
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignInfo {
    pub fname: String,
    pub name: String,
    pub single_levels: Vec<i32>,
    pub bonus_levels: Vec<i32>,
    pub extra_levels: Vec<i32>,
}

impl CampaignInfo {
    pub fn new(fname: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            fname: fname.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_single_levels(mut self, levels: impl IntoIterator<Item = i32>) -> Self {
        self.single_levels = levels.into_iter().collect();
        self
    }

    pub fn with_bonus_levels(mut self, levels: impl IntoIterator<Item = i32>) -> Self {
        self.bonus_levels = levels.into_iter().collect();
        self
    }

    pub fn with_extra_levels(mut self, levels: impl IntoIterator<Item = i32>) -> Self {
        self.extra_levels = levels.into_iter().collect();
        self
    }

    pub fn contains_level(&self, level: i32) -> bool {
        level > 0
            && (self.single_levels.contains(&level)
                || self.bonus_levels.contains(&level)
                || self.extra_levels.contains(&level))
    }
}

/// Known campaigns keyed by their file name, plus the active one.
#[derive(Debug, Clone, Default)]
pub struct CampaignRegistry {
    campaigns: BTreeMap<String, CampaignInfo>,
    active: Option<String>,
}

impl CampaignRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, info: CampaignInfo) {
        self.campaigns.insert(info.fname.clone(), info);
    }

    pub fn active(&self) -> Option<&CampaignInfo> {
        self.active.as_ref().and_then(|f| self.campaigns.get(f))
    }
}

impl Campaigns for CampaignRegistry {
    fn change_campaign(&mut self, fname: &str) -> bool {
        if !self.campaigns.contains_key(fname) {
            log::warn!("campaign {fname:?} is not known");
            return false;
        }
        self.active = Some(fname.to_string());
        true
    }

    fn is_singleplayer_like_level(&self, level: i32) -> bool {
        self.active().is_some_and(|c| c.contains_level(level))
    }

    fn campaign_name(&self) -> Option<&str> {
        self.active().map(|c| c.name.as_str())
    }
}
