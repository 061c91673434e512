//! Report model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use nubz_common::{Error, ExhibitId, ExperimentId, ReportId, ReportState, Result};

/// Answers given to one survey.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyAnswers {
    /// Free-text answers, one per simple question.
    pub simple: Vec<String>,
    /// Chosen option ids, one list per multiple-choice question.
    pub multiple_choice: Vec<Vec<i32>>,
    /// Option ids in the visitor's order, one list per sort question.
    pub sort: Vec<Vec<i32>>,
}

/// Experiment a visitor takes part in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    pub id: ExperimentId,
    pub name: String,
    /// Survey filled in before the walk.
    pub survey_before: SurveyAnswers,
    /// Survey filled in after the walk.
    pub survey_after: SurveyAnswers,
}

impl Experiment {
    pub fn new(id: ExperimentId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            survey_before: SurveyAnswers::default(),
            survey_after: SurveyAnswers::default(),
        }
    }
}

/// One step of a visitor's walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEvent {
    /// Time spent on the step.
    pub duration_secs: u32,
    /// Actions taken, in order.
    pub actions: Vec<String>,
    /// Exhibit the step happened at, if any.
    pub exhibit_id: Option<ExhibitId>,
}

impl ReportEvent {
    /// Event spent away from any exhibit.
    pub fn new(duration_secs: u32, actions: Vec<String>) -> Self {
        Self {
            duration_secs,
            actions,
            exhibit_id: None,
        }
    }

    /// Attach the event to an exhibit.
    pub fn at_exhibit(mut self, exhibit: ExhibitId) -> Self {
        self.exhibit_id = Some(exhibit);
        self
    }
}

/// Record of one visitor's walk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    id: ReportId,
    experiment_id: ExperimentId,
    created_at: DateTime<Utc>,
    state: ReportState,
    survey_before: SurveyAnswers,
    survey_after: SurveyAnswers,
    history: Vec<ReportEvent>,
}

impl Report {
    /// Start recording a report for `experiment`.
    ///
    /// # Postconditions
    /// - State is RECORDING and the history is empty
    /// - Survey answers are a copy of the experiment's at this moment
    pub fn new(id: ReportId, experiment: &Experiment) -> Self {
        Self {
            id,
            experiment_id: experiment.id,
            created_at: Utc::now(),
            state: ReportState::Recording,
            survey_before: experiment.survey_before.clone(),
            survey_after: experiment.survey_after.clone(),
            history: Vec::new(),
        }
    }

    pub fn id(&self) -> ReportId {
        self.id
    }

    pub fn experiment_id(&self) -> ExperimentId {
        self.experiment_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> ReportState {
        self.state
    }

    pub fn survey_before(&self) -> &SurveyAnswers {
        &self.survey_before
    }

    pub fn survey_after(&self) -> &SurveyAnswers {
        &self.survey_after
    }

    pub fn history(&self) -> &[ReportEvent] {
        &self.history
    }

    /// Append an event.
    ///
    /// # Errors
    /// - Report is no longer recording
    pub fn add_event(&mut self, event: ReportEvent) -> Result<()> {
        if self.state != ReportState::Recording {
            return Err(Error::InvalidState(format!(
                "Report {} is {}, cannot append events",
                self.id, self.state
            )));
        }
        self.history.push(event);
        Ok(())
    }

    /// Finish recording.
    ///
    /// # Errors
    /// - Report is not recording
    pub fn mark_as_ready(&mut self) -> Result<()> {
        self.transition(ReportState::ReadyToSend)
    }

    /// Record that the remote service acknowledged the report.
    ///
    /// # Errors
    /// - Report is not ready to send
    pub fn mark_as_sent(&mut self) -> Result<()> {
        self.transition(ReportState::Sent)
    }

    fn transition(&mut self, next: ReportState) -> Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(Error::InvalidState(format!(
                "Report {} cannot go from {} to {}",
                self.id, self.state, next
            )));
        }
        self.state = next;
        Ok(())
    }
}
