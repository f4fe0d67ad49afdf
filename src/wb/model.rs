use serde::Deserialize;

use crate::model::FeedbackStatus;

/// Body of `GET /api/v1/new-feedbacks-questions`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackEnvelope {
    #[serde(default)]
    pub data: Option<FeedbackData>,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub error_text: Option<String>,
    #[serde(default)]
    pub additional_errors: Option<Vec<String>>,
}

#[derive(Deserialize, Debug, Default, Clone, Copy)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedbackData {
    pub has_new_feedbacks: bool,
    pub has_new_questions: bool,
    pub feedbacks_count: i64,
    pub questions_count: i64,
}

impl From<FeedbackData> for FeedbackStatus {
    fn from(d: FeedbackData) -> Self {
        FeedbackStatus {
            has_new_feedbacks: d.has_new_feedbacks,
            has_new_questions: d.has_new_questions,
            feedbacks_count: d.feedbacks_count,
            questions_count: d.questions_count,
        }
    }
}
