use chrono::Utc;
use std::collections::HashSet;
use uuid::Uuid;

use crate::database::{Database, SubmissionFilter};
use crate::errors::ApiError;
use crate::models::*;
use crate::{log_service_start, log_service_success};

const SERVICE: &str = "learning_service";

/// Upper bound on minutes reported by a single progress update.
pub const MAX_TIME_SPENT_PER_UPDATE: i64 = 24 * 60;

/// Lessons, quizzes, submissions and per-student progress.
#[derive(Clone)]
pub struct LearningService {
    db: Database,
}

impl LearningService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // Lessons

    pub async fn list_lessons(&self) -> Result<Vec<Lesson>, ApiError> {
        Ok(self.db.list_lessons().await?)
    }

    pub async fn get_lesson(&self, id: Uuid) -> Result<Lesson, ApiError> {
        self.db
            .get_lesson(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Lesson not found".to_string()))
    }

    pub async fn create_lesson(
        &self,
        author: Uuid,
        request: CreateLessonRequest,
    ) -> Result<Lesson, ApiError> {
        let title = required(&request.title);
        let content = required(&request.content);
        let category = required(&request.category);
        let (Some(title), Some(content), Some(category)) = (title, content, category) else {
            return Err(ApiError::ValidationError(
                "Title, content and category are required".to_string(),
            ));
        };

        let now = Utc::now();
        let lesson = Lesson {
            id: Uuid::new_v4(),
            title,
            content,
            category,
            difficulty: request.difficulty.unwrap_or_default(),
            author: Some(author),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_lesson(&lesson).await?;

        log_service_success!(SERVICE, "create_lesson", resource_id = lesson.id, "lesson created");
        Ok(lesson)
    }

    /// Blank fields in the request leave the stored value untouched.
    pub async fn update_lesson(
        &self,
        id: Uuid,
        request: UpdateLessonRequest,
    ) -> Result<Lesson, ApiError> {
        let mut lesson = self.get_lesson(id).await?;

        if let Some(title) = request.title.as_deref().and_then(required) {
            lesson.title = title;
        }
        if let Some(content) = request.content.as_deref().and_then(required) {
            lesson.content = content;
        }
        if let Some(category) = request.category.as_deref().and_then(required) {
            lesson.category = category;
        }
        if let Some(difficulty) = request.difficulty {
            lesson.difficulty = difficulty;
        }
        lesson.updated_at = Utc::now();

        self.db.update_lesson(&lesson).await?;
        Ok(lesson)
    }

    pub async fn delete_lesson(&self, id: Uuid) -> Result<(), ApiError> {
        if !self.db.delete_lesson(id).await? {
            return Err(ApiError::NotFound("Lesson not found".to_string()));
        }
        log_service_success!(SERVICE, "delete_lesson", resource_id = id, "lesson and dependents removed");
        Ok(())
    }

    // Quizzes

    pub async fn create_quiz(&self, creator: Uuid, request: CreateQuizRequest) -> Result<Quiz, ApiError> {
        let title = required(&request.title)
            .ok_or_else(|| ApiError::ValidationError("Quiz title is required".to_string()))?;
        if request.questions.is_empty() {
            return Err(ApiError::ValidationError(
                "A quiz needs at least one question".to_string(),
            ));
        }

        let mut questions = Vec::with_capacity(request.questions.len());
        for question in request.questions {
            let (Some(question_text), Some(correct_answer)) =
                (required(&question.question_text), required(&question.correct_answer))
            else {
                return Err(ApiError::ValidationError(
                    "Every question needs text and a correct answer".to_string(),
                ));
            };
            questions.push(QuizQuestion {
                id: Uuid::new_v4(),
                question_text,
                options: question.options,
                correct_answer,
                voice_answer_enabled: question.voice_answer_enabled,
            });
        }

        self.get_lesson(request.lesson_id).await?;

        let now = Utc::now();
        let quiz = Quiz {
            id: Uuid::new_v4(),
            lesson_id: request.lesson_id,
            title,
            questions,
            created_by: Some(creator),
            created_at: now,
            updated_at: now,
        };
        self.db.insert_quiz(&quiz).await?;

        log_service_success!(SERVICE, "create_quiz", resource_id = quiz.id, "quiz created");
        Ok(quiz)
    }

    pub async fn get_quiz_for_lesson(&self, lesson_id: Uuid) -> Result<Quiz, ApiError> {
        self.db
            .get_quiz_for_lesson(lesson_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Quiz not found for this lesson".to_string()))
    }

    // Submissions

    /// Grades each answer against the quiz and mirrors the score onto the
    /// student's progress row for the quiz's lesson.
    pub async fn create_submission(
        &self,
        user_id: Uuid,
        request: CreateSubmissionRequest,
    ) -> Result<Submission, ApiError> {
        log_service_start!(SERVICE, "create_submission", user_id = user_id);

        let quiz = self
            .db
            .get_quiz(request.quiz_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Quiz not found".to_string()))?;

        let (answers, computed_score) = grade_answers(&quiz, request.answers);
        let score = request.score.unwrap_or(computed_score);
        if !(0.0..=100.0).contains(&score) {
            return Err(ApiError::ValidationError(
                "Score must be between 0 and 100".to_string(),
            ));
        }

        let now = Utc::now();
        let submission = Submission {
            id: Uuid::new_v4(),
            user_id,
            quiz_id: quiz.id,
            answers,
            score: Some(score),
            teacher_feedback: None,
            status: SubmissionStatus::Submitted,
            created_at: now,
            updated_at: now,
        };
        self.db.insert_submission(&submission).await?;
        self.db.record_quiz_score(user_id, quiz.lesson_id, score).await?;

        log_service_success!(SERVICE, "create_submission", resource_id = submission.id, "submission graded");
        Ok(submission)
    }

    /// Staff see every submission; students see their own.
    pub async fn list_submissions(
        &self,
        user_id: Uuid,
        is_staff: bool,
    ) -> Result<Vec<SubmissionView>, ApiError> {
        let filter = SubmissionFilter {
            user_id: (!is_staff).then_some(user_id),
            lesson_id: None,
        };
        Ok(self.db.list_submissions(filter).await?)
    }

    pub async fn list_lesson_submissions(&self, lesson_id: Uuid) -> Result<Vec<SubmissionView>, ApiError> {
        let filter = SubmissionFilter {
            user_id: None,
            lesson_id: Some(lesson_id),
        };
        Ok(self.db.list_submissions(filter).await?)
    }

    pub async fn add_feedback(&self, id: Uuid, request: FeedbackRequest) -> Result<Submission, ApiError> {
        let mut submission = self
            .db
            .get_submission(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Submission not found".to_string()))?;

        if let Some(score) = request.score {
            if !(0.0..=100.0).contains(&score) {
                return Err(ApiError::ValidationError(
                    "Score must be between 0 and 100".to_string(),
                ));
            }
            submission.score = Some(score);
        }
        submission.teacher_feedback = Some(request.feedback);
        submission.status = SubmissionStatus::Graded;
        submission.updated_at = Utc::now();

        self.db.update_submission(&submission).await?;
        log_service_success!(SERVICE, "add_feedback", resource_id = id, "submission graded by teacher");
        Ok(submission)
    }

    // Progress

    pub async fn update_progress(
        &self,
        user_id: Uuid,
        request: UpdateProgressRequest,
    ) -> Result<Progress, ApiError> {
        let time_spent = request.time_spent.unwrap_or(0);
        if time_spent < 0 {
            return Err(ApiError::ValidationError(
                "timeSpent cannot be negative".to_string(),
            ));
        }
        if time_spent > MAX_TIME_SPENT_PER_UPDATE {
            return Err(ApiError::ValidationError(format!(
                "timeSpent cannot exceed {} minutes per update",
                MAX_TIME_SPENT_PER_UPDATE
            )));
        }
        self.get_lesson(request.lesson_id).await?;

        let progress = self
            .db
            .upsert_progress(user_id, request.lesson_id, request.is_completed, time_spent)
            .await?;
        Ok(progress)
    }

    pub async fn list_progress(&self) -> Result<Vec<ProgressView>, ApiError> {
        Ok(self.db.list_progress(None).await?)
    }

    pub async fn student_progress(&self, student_id: Uuid) -> Result<Vec<ProgressView>, ApiError> {
        Ok(self.db.list_progress(Some(student_id)).await?)
    }

    pub async fn progress_summary(&self, user_id: Uuid) -> Result<ProgressSummary, ApiError> {
        let records = self.db.list_progress(Some(user_id)).await?;
        let total_lessons = self.db.count_lessons().await?;
        Ok(summarize(total_lessons, records))
    }
}

fn required(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn answers_match(given: &str, expected: &str) -> bool {
    given.trim().to_lowercase() == expected.trim().to_lowercase()
}

/// Answers without a question id are matched to questions by position.
/// Each question counts toward the score at most once.
fn grade_answers(quiz: &Quiz, answers: Vec<AnswerInput>) -> (Vec<SubmittedAnswer>, f64) {
    let mut answered_correctly = HashSet::new();
    let graded = answers
        .into_iter()
        .enumerate()
        .map(|(index, answer)| {
            let question = match answer.question_id {
                Some(id) => quiz.questions.iter().find(|q| q.id == id),
                None => quiz.questions.get(index),
            };
            let is_correct = question.map(|q| answers_match(&answer.answer_text, &q.correct_answer));
            if let (Some(q), Some(true)) = (question, is_correct) {
                answered_correctly.insert(q.id);
            }
            SubmittedAnswer {
                question_id: question.map(|q| q.id),
                answer_text: answer.answer_text,
                is_correct,
            }
        })
        .collect();

    let total = quiz.questions.len();
    let score = if total == 0 {
        0.0
    } else {
        (answered_correctly.len() as f64 * 100.0 / total as f64).round()
    };
    (graded, score)
}

fn summarize(total_lessons: i64, records: Vec<ProgressView>) -> ProgressSummary {
    let completed_lessons = records.iter().filter(|r| r.progress.is_completed).count() as i64;
    let total_time_spent = records.iter().map(|r| r.progress.time_spent).sum();
    let avg_quiz_score = if records.is_empty() {
        0
    } else {
        let sum: f64 = records.iter().map(|r| r.progress.quiz_score).sum();
        (sum / records.len() as f64).round() as i64
    };
    let progress_percent = if total_lessons > 0 {
        (completed_lessons as f64 * 100.0 / total_lessons as f64).round() as i64
    } else {
        0
    };

    ProgressSummary {
        total_lessons,
        completed_lessons,
        total_time_spent,
        avg_quiz_score,
        progress_percent,
        records,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(answers: &[&str]) -> Quiz {
        let now = Utc::now();
        Quiz {
            id: Uuid::new_v4(),
            lesson_id: Uuid::new_v4(),
            title: "Check".to_string(),
            questions: answers
                .iter()
                .map(|a| QuizQuestion {
                    id: Uuid::new_v4(),
                    question_text: "?".to_string(),
                    options: vec![],
                    correct_answer: a.to_string(),
                    voice_answer_enabled: false,
                })
                .collect(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn answer(question_id: Option<Uuid>, text: &str) -> AnswerInput {
        AnswerInput {
            question_id,
            answer_text: text.to_string(),
        }
    }

    #[test]
    fn test_grading_matches_by_id_and_position() {
        let quiz = quiz(&["Paris", "4", "Blue"]);
        let answers = vec![
            answer(Some(quiz.questions[1].id), " 4 "),
            answer(None, "london"),
            answer(None, "BLUE"),
        ];

        let (graded, score) = grade_answers(&quiz, answers);
        assert_eq!(graded[0].is_correct, Some(true));
        assert_eq!(graded[1].is_correct, Some(false));
        assert_eq!(graded[2].is_correct, Some(true));
        assert_eq!(score, 67.0);
    }

    #[test]
    fn test_repeated_answers_count_once_per_question() {
        let quiz = quiz(&["2", "7"]);
        let first = quiz.questions[0].id;
        let answers = vec![answer(Some(first), "2"), answer(Some(first), "2")];

        let (graded, score) = grade_answers(&quiz, answers);
        assert_eq!(graded.len(), 2);
        assert!(graded.iter().all(|a| a.is_correct == Some(true)));
        assert_eq!(score, 50.0);

        // Positional and id-based answers to the same question also collapse.
        let answers = vec![answer(None, "2"), answer(Some(first), "2")];
        let (_, score) = grade_answers(&quiz, answers);
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_unknown_question_is_left_ungraded() {
        let quiz = quiz(&["yes"]);
        let (graded, score) = grade_answers(&quiz, vec![answer(Some(Uuid::new_v4()), "yes")]);
        assert_eq!(graded[0].is_correct, None);
        assert_eq!(graded[0].question_id, None);
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_summary_rounds_like_the_dashboard() {
        let now = Utc::now();
        let record = |completed: bool, score: f64, minutes: i64| ProgressView {
            progress: Progress {
                id: Uuid::new_v4(),
                user_id: Uuid::new_v4(),
                lesson_id: Uuid::new_v4(),
                is_completed: completed,
                last_accessed_at: now,
                quiz_score: score,
                time_spent: minutes,
                created_at: now,
                updated_at: now,
            },
            student_name: None,
            student_email: None,
            lesson: None,
        };

        let summary = summarize(3, vec![record(true, 80.0, 10), record(false, 45.0, 5)]);
        assert_eq!(summary.completed_lessons, 1);
        assert_eq!(summary.total_time_spent, 15);
        assert_eq!(summary.avg_quiz_score, 63);
        assert_eq!(summary.progress_percent, 33);

        let empty = summarize(0, vec![]);
        assert_eq!(empty.avg_quiz_score, 0);
        assert_eq!(empty.progress_percent, 0);
    }
}
