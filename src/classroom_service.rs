use uuid::Uuid;

use crate::account_service::normalize_email;
use crate::database::Database;
use crate::errors::ApiError;
use crate::models::*;
use crate::{log_service_start, log_service_success};

const SERVICE: &str = "classroom_service";

/// A teacher's roster and the lesson tasks they hand out.
#[derive(Clone)]
pub struct ClassroomService {
    db: Database,
}

impl ClassroomService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_students(&self, teacher_id: Uuid) -> Result<Vec<StudentRef>, ApiError> {
        Ok(self.db.list_classroom_students(teacher_id).await?)
    }

    pub async fn add_student(
        &self,
        teacher_id: Uuid,
        request: AddStudentRequest,
    ) -> Result<StudentRef, ApiError> {
        log_service_start!(SERVICE, "add_student", user_id = teacher_id);

        let email = request
            .email
            .as_deref()
            .map(normalize_email)
            .filter(|e| !e.is_empty())
            .ok_or_else(|| ApiError::ValidationError("Email is required".to_string()))?;

        let student = self
            .db
            .get_user_by_email(&email)
            .await?
            .filter(|user| user.role == Role::Student)
            .ok_or_else(|| {
                ApiError::NotFound("No registered student found with that email.".to_string())
            })?;

        let classroom = self.db.get_or_create_classroom(teacher_id).await?;
        if !self.db.add_classroom_student(classroom.id, student.id).await? {
            return Err(ApiError::DuplicateResource(
                "Student already in your classroom.".to_string(),
            ));
        }

        log_service_success!(SERVICE, "add_student", resource_id = student.id, "student added to classroom");
        Ok(StudentRef {
            id: student.id,
            name: student.name,
            email: student.email,
            disability_type: student.disability_type,
        })
    }

    /// Removing someone who is not on the roster is not an error.
    pub async fn remove_student(&self, teacher_id: Uuid, student_id: Uuid) -> Result<(), ApiError> {
        let classroom = self
            .db
            .get_classroom(teacher_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Classroom not found".to_string()))?;

        self.db.remove_classroom_student(classroom.id, student_id).await?;
        Ok(())
    }

    pub async fn assign_task(&self, teacher_id: Uuid, request: AssignTaskRequest) -> Result<Task, ApiError> {
        let title = request.title.as_deref().map(str::trim).unwrap_or_default();
        let lesson_id = match request.lesson_id {
            Some(id) if !title.is_empty() && !request.student_ids.is_empty() => id,
            _ => {
                return Err(ApiError::ValidationError(
                    "Title, lesson, and at least one student are required.".to_string(),
                ));
            }
        };

        if self.db.get_lesson(lesson_id).await?.is_none() {
            return Err(ApiError::NotFound("Lesson not found".to_string()));
        }

        for student_id in &request.student_ids {
            if self.db.get_user(*student_id).await?.is_none() {
                return Err(ApiError::ValidationError(format!(
                    "Unknown student {}",
                    student_id
                )));
            }
        }

        let id = Uuid::new_v4();
        self.db
            .insert_task(
                id,
                teacher_id,
                lesson_id,
                &request.student_ids,
                title,
                request.due_date,
                request.note.as_deref().unwrap_or_default(),
            )
            .await?;

        log_service_success!(SERVICE, "assign_task", resource_id = id, "task assigned");
        self.db
            .get_task(id)
            .await?
            .ok_or_else(|| ApiError::InternalError("task missing after insert".to_string()))
    }

    pub async fn list_teacher_tasks(&self, teacher_id: Uuid) -> Result<Vec<Task>, ApiError> {
        Ok(self.db.list_tasks(Some(teacher_id)).await?)
    }

    pub async fn list_all_tasks(&self) -> Result<Vec<Task>, ApiError> {
        Ok(self.db.list_tasks(None).await?)
    }
}
