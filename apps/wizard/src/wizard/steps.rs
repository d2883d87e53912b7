use serde::{Deserialize, Serialize};

use crate::models::sections::SectionKind;

/// The ten wizard steps, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    PersonalInfo,
    Summary,
    Experience,
    Education,
    Skills,
    Projects,
    Certifications,
    Languages,
    Awards,
    Template,
}

pub const TOTAL_STEPS: u8 = 10;

impl WizardStep {
    pub const ALL: [WizardStep; TOTAL_STEPS as usize] = [
        WizardStep::PersonalInfo,
        WizardStep::Summary,
        WizardStep::Experience,
        WizardStep::Education,
        WizardStep::Skills,
        WizardStep::Projects,
        WizardStep::Certifications,
        WizardStep::Languages,
        WizardStep::Awards,
        WizardStep::Template,
    ];

    pub const FIRST: WizardStep = WizardStep::PersonalInfo;
    pub const LAST: WizardStep = WizardStep::Template;

    /// 1-based position.
    pub fn number(self) -> u8 {
        Self::ALL
            .iter()
            .position(|s| *s == self)
            .map(|i| i as u8 + 1)
            .unwrap_or(1)
    }

    pub fn from_number(n: u8) -> Option<Self> {
        n.checked_sub(1)
            .and_then(|i| Self::ALL.get(usize::from(i)))
            .copied()
    }

    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    pub fn prev(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    pub fn is_last(self) -> bool {
        self == Self::LAST
    }

    pub fn title(self) -> &'static str {
        match self {
            WizardStep::PersonalInfo => "Personal Info",
            WizardStep::Summary => "Summary",
            WizardStep::Experience => "Experience",
            WizardStep::Education => "Education",
            WizardStep::Skills => "Skills",
            WizardStep::Projects => "Projects",
            WizardStep::Certifications => "Certifications",
            WizardStep::Languages => "Languages",
            WizardStep::Awards => "Awards",
            WizardStep::Template => "Template",
        }
    }

    /// The section edited on this step, if any.
    pub fn section(self) -> Option<SectionKind> {
        match self {
            WizardStep::Experience => Some(SectionKind::Experience),
            WizardStep::Education => Some(SectionKind::Education),
            WizardStep::Skills => Some(SectionKind::Skills),
            WizardStep::Projects => Some(SectionKind::Projects),
            WizardStep::Certifications => Some(SectionKind::Certifications),
            WizardStep::Languages => Some(SectionKind::Languages),
            WizardStep::Awards => Some(SectionKind::Awards),
            WizardStep::PersonalInfo | WizardStep::Summary | WizardStep::Template => None,
        }
    }
}
