use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Instant;
use uuid::Uuid;

use crate::log_db_operation;
use crate::models::*;

/// Ceiling for the accumulated minutes on one progress row.
pub const MAX_TOTAL_TIME_SPENT: i64 = i32::MAX as i64;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

/// Optional filters for submission listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct SubmissionFilter {
    pub user_id: Option<Uuid>,
    pub lesson_id: Option<Uuid>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);

        // Every connection to `sqlite::memory:` opens a fresh database, so keep exactly one alive.
        let pool = if database_url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        let db = Database { pool };
        db.migrate().await?;
        log_db_operation!(info, "migrate", "database initialized");
        Ok(db)
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'student',
                disability_type TEXT NOT NULL DEFAULT 'none',
                reset_password_token TEXT,
                reset_password_expires TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lessons (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                category TEXT NOT NULL,
                difficulty TEXT NOT NULL DEFAULT 'Beginner',
                author_id TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quizzes (
                id TEXT PRIMARY KEY,
                lesson_id TEXT NOT NULL,
                title TEXT NOT NULL,
                questions TEXT NOT NULL,
                created_by TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS submissions (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                quiz_id TEXT NOT NULL,
                answers TEXT NOT NULL,
                score REAL,
                teacher_feedback TEXT,
                status TEXT NOT NULL DEFAULT 'submitted',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (quiz_id) REFERENCES quizzes(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                lesson_id TEXT NOT NULL,
                is_completed INTEGER NOT NULL DEFAULT 0,
                last_accessed_at TEXT NOT NULL,
                quiz_score REAL NOT NULL DEFAULT 0,
                time_spent INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (user_id, lesson_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classrooms (
                id TEXT PRIMARY KEY,
                teacher_id TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (teacher_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS classroom_students (
                classroom_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (classroom_id, student_id),
                FOREIGN KEY (classroom_id) REFERENCES classrooms(id) ON DELETE CASCADE,
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                teacher_id TEXT NOT NULL,
                lesson_id TEXT NOT NULL,
                title TEXT NOT NULL,
                due_date TEXT,
                note TEXT NOT NULL DEFAULT '',
                status TEXT NOT NULL DEFAULT 'assigned',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (teacher_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (lesson_id) REFERENCES lessons(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_students (
                task_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                position INTEGER NOT NULL,
                PRIMARY KEY (task_id, student_id),
                FOREIGN KEY (task_id) REFERENCES tasks(id) ON DELETE CASCADE,
                FOREIGN KEY (student_id) REFERENCES users(id) ON DELETE CASCADE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    // User operations
    pub async fn insert_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password_hash, role, disability_type,
                               reset_password_token, reset_password_expires, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(user.id.to_string())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.disability_type.as_str())
        .bind(&user.reset_password_token)
        .bind(user.reset_password_expires.as_ref().map(timestamp))
        .bind(timestamp(&user.created_at))
        .bind(timestamp(&user.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn get_user_by_reset_token(&self, token_hash: &str) -> Result<Option<User>> {
        let row = sqlx::query("SELECT * FROM users WHERE reset_password_token = ?1")
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_user).transpose()
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        let started = Instant::now();
        let rows = sqlx::query("SELECT * FROM users ORDER BY created_at DESC, rowid DESC")
            .fetch_all(&self.pool)
            .await?;

        let users = rows.iter().map(row_to_user).collect::<Result<Vec<_>>>()?;
        log_db_operation!(
            debug,
            "list_users",
            count = users.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(users)
    }

    /// Overwrites every mutable column of the user row.
    pub async fn update_user(&self, user: &User) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET name = ?1, email = ?2, password_hash = ?3, role = ?4, disability_type = ?5,
                reset_password_token = ?6, reset_password_expires = ?7, updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.disability_type.as_str())
        .bind(&user.reset_password_token)
        .bind(user.reset_password_expires.as_ref().map(timestamp))
        .bind(timestamp(&user.updated_at))
        .bind(user.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_reset_token(
        &self,
        user_id: Uuid,
        token_hash: Option<&str>,
        expires: Option<DateTime<Utc>>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE users SET reset_password_token = ?1, reset_password_expires = ?2, updated_at = ?3 WHERE id = ?4",
        )
        .bind(token_hash)
        .bind(expires.as_ref().map(timestamp))
        .bind(timestamp(&Utc::now()))
        .bind(user_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Lesson operations
    pub async fn insert_lesson(&self, lesson: &Lesson) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO lessons (id, title, content, category, difficulty, author_id, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(lesson.id.to_string())
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(&lesson.category)
        .bind(lesson.difficulty.as_str())
        .bind(lesson.author.map(|id| id.to_string()))
        .bind(timestamp(&lesson.created_at))
        .bind(timestamp(&lesson.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_lesson(&self, id: Uuid) -> Result<Option<Lesson>> {
        let row = sqlx::query("SELECT * FROM lessons WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_lesson).transpose()
    }

    pub async fn list_lessons(&self) -> Result<Vec<Lesson>> {
        let started = Instant::now();
        let rows = sqlx::query("SELECT * FROM lessons ORDER BY created_at ASC, rowid ASC")
            .fetch_all(&self.pool)
            .await?;

        let lessons = rows.iter().map(row_to_lesson).collect::<Result<Vec<_>>>()?;
        log_db_operation!(
            debug,
            "list_lessons",
            count = lessons.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(lessons)
    }

    pub async fn count_lessons(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lessons")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn update_lesson(&self, lesson: &Lesson) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE lessons
            SET title = ?1, content = ?2, category = ?3, difficulty = ?4, updated_at = ?5
            WHERE id = ?6
            "#,
        )
        .bind(&lesson.title)
        .bind(&lesson.content)
        .bind(&lesson.category)
        .bind(lesson.difficulty.as_str())
        .bind(timestamp(&lesson.updated_at))
        .bind(lesson.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Deleting a lesson cascades to its quizzes, their submissions, progress rows and tasks.
    pub async fn delete_lesson(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM lessons WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    // Quiz operations
    pub async fn insert_quiz(&self, quiz: &Quiz) -> Result<()> {
        let questions_json = serde_json::to_string(&quiz.questions)?;

        sqlx::query(
            r#"
            INSERT INTO quizzes (id, lesson_id, title, questions, created_by, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(quiz.id.to_string())
        .bind(quiz.lesson_id.to_string())
        .bind(&quiz.title)
        .bind(questions_json)
        .bind(quiz.created_by.map(|id| id.to_string()))
        .bind(timestamp(&quiz.created_at))
        .bind(timestamp(&quiz.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_quiz(&self, id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query("SELECT * FROM quizzes WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_quiz).transpose()
    }

    /// The first quiz created for the lesson.
    pub async fn get_quiz_for_lesson(&self, lesson_id: Uuid) -> Result<Option<Quiz>> {
        let row = sqlx::query(
            "SELECT * FROM quizzes WHERE lesson_id = ?1 ORDER BY created_at ASC, rowid ASC LIMIT 1",
        )
        .bind(lesson_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_quiz).transpose()
    }

    // Submission operations
    pub async fn insert_submission(&self, submission: &Submission) -> Result<()> {
        let answers_json = serde_json::to_string(&submission.answers)?;

        sqlx::query(
            r#"
            INSERT INTO submissions (id, user_id, quiz_id, answers, score, teacher_feedback, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(submission.id.to_string())
        .bind(submission.user_id.to_string())
        .bind(submission.quiz_id.to_string())
        .bind(answers_json)
        .bind(submission.score)
        .bind(&submission.teacher_feedback)
        .bind(submission.status.as_str())
        .bind(timestamp(&submission.created_at))
        .bind(timestamp(&submission.updated_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_submission(&self, id: Uuid) -> Result<Option<Submission>> {
        let row = sqlx::query("SELECT * FROM submissions WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_submission).transpose()
    }

    pub async fn update_submission(&self, submission: &Submission) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE submissions
            SET score = ?1, teacher_feedback = ?2, status = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
        )
        .bind(submission.score)
        .bind(&submission.teacher_feedback)
        .bind(submission.status.as_str())
        .bind(timestamp(&submission.updated_at))
        .bind(submission.id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Newest first, with student and quiz resolved.
    pub async fn list_submissions(&self, filter: SubmissionFilter) -> Result<Vec<SubmissionView>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT s.*, u.name AS student_name, u.email AS student_email, q.title AS quiz_title
            FROM submissions s
            LEFT JOIN users u ON u.id = s.user_id
            LEFT JOIN quizzes q ON q.id = s.quiz_id
            WHERE (?1 IS NULL OR s.user_id = ?1)
              AND (?2 IS NULL OR q.lesson_id = ?2)
            ORDER BY s.created_at DESC, s.rowid DESC
            "#,
        )
        .bind(filter.user_id.map(|id| id.to_string()))
        .bind(filter.lesson_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            views.push(SubmissionView {
                submission: row_to_submission(row)?,
                student_name: row.try_get("student_name")?,
                student_email: row.try_get("student_email")?,
                quiz_title: row.try_get("quiz_title")?,
            });
        }

        log_db_operation!(
            debug,
            "list_submissions",
            count = views.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(views)
    }

    // Progress operations

    /// Insert-or-update in one statement: `time_spent` accumulates up to
    /// `MAX_TOTAL_TIME_SPENT`, `is_completed` is overwritten only when supplied.
    pub async fn upsert_progress(
        &self,
        user_id: Uuid,
        lesson_id: Uuid,
        is_completed: Option<bool>,
        time_spent: i64,
    ) -> Result<Progress> {
        let now = timestamp(&Utc::now());
        // Both operands stay within i32 range, so the sum cannot leave INTEGER.
        let time_spent = time_spent.clamp(0, MAX_TOTAL_TIME_SPENT);

        sqlx::query(
            r#"
            INSERT INTO progress (id, user_id, lesson_id, is_completed, last_accessed_at,
                                  quiz_score, time_spent, created_at, updated_at)
            VALUES (?1, ?2, ?3, COALESCE(?4, 0), ?5, 0, ?6, ?5, ?5)
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                is_completed = COALESCE(?4, progress.is_completed),
                time_spent = MIN(progress.time_spent + excluded.time_spent, ?7),
                last_accessed_at = excluded.last_accessed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(lesson_id.to_string())
        .bind(is_completed)
        .bind(&now)
        .bind(time_spent)
        .bind(MAX_TOTAL_TIME_SPENT)
        .execute(&self.pool)
        .await?;

        self.get_progress(user_id, lesson_id)
            .await?
            .context("progress row missing after upsert")
    }

    pub async fn record_quiz_score(&self, user_id: Uuid, lesson_id: Uuid, score: f64) -> Result<()> {
        let now = timestamp(&Utc::now());

        sqlx::query(
            r#"
            INSERT INTO progress (id, user_id, lesson_id, is_completed, last_accessed_at,
                                  quiz_score, time_spent, created_at, updated_at)
            VALUES (?1, ?2, ?3, 0, ?4, ?5, 0, ?4, ?4)
            ON CONFLICT (user_id, lesson_id) DO UPDATE SET
                quiz_score = excluded.quiz_score,
                last_accessed_at = excluded.last_accessed_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id.to_string())
        .bind(lesson_id.to_string())
        .bind(&now)
        .bind(score)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_progress(&self, user_id: Uuid, lesson_id: Uuid) -> Result<Option<Progress>> {
        let row = sqlx::query("SELECT * FROM progress WHERE user_id = ?1 AND lesson_id = ?2")
            .bind(user_id.to_string())
            .bind(lesson_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(row_to_progress).transpose()
    }

    /// All progress rows, or one student's when `user_id` is given.
    pub async fn list_progress(&self, user_id: Option<Uuid>) -> Result<Vec<ProgressView>> {
        let started = Instant::now();
        let rows = sqlx::query(
            r#"
            SELECT p.*,
                   u.name AS student_name, u.email AS student_email,
                   l.title AS lesson_title, l.category AS lesson_category,
                   l.difficulty AS lesson_difficulty
            FROM progress p
            LEFT JOIN users u ON u.id = p.user_id
            LEFT JOIN lessons l ON l.id = p.lesson_id
            WHERE (?1 IS NULL OR p.user_id = ?1)
            ORDER BY p.updated_at DESC, p.rowid DESC
            "#,
        )
        .bind(user_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;

        let mut views = Vec::with_capacity(rows.len());
        for row in &rows {
            let progress = row_to_progress(row)?;
            let lesson = match row.try_get::<Option<String>, _>("lesson_title")? {
                Some(title) => Some(LessonRef {
                    id: progress.lesson_id,
                    title,
                    category: row.try_get("lesson_category")?,
                    difficulty: row.try_get::<String, _>("lesson_difficulty")?.parse()?,
                }),
                None => None,
            };
            views.push(ProgressView {
                progress,
                student_name: row.try_get("student_name")?,
                student_email: row.try_get("student_email")?,
                lesson,
            });
        }

        log_db_operation!(
            debug,
            "list_progress",
            count = views.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(views)
    }

    // Classroom operations
    pub async fn get_classroom(&self, teacher_id: Uuid) -> Result<Option<Classroom>> {
        let row = sqlx::query("SELECT id FROM classrooms WHERE teacher_id = ?1")
            .bind(teacher_id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id = parse_uuid(&row, "id")?;

        let student_rows = sqlx::query(
            "SELECT student_id FROM classroom_students WHERE classroom_id = ?1 ORDER BY position ASC",
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let students = student_rows
            .iter()
            .map(|r| parse_uuid(r, "student_id"))
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(Classroom {
            id,
            teacher: teacher_id,
            students,
        }))
    }

    /// Classrooms are created lazily, one per teacher.
    pub async fn get_or_create_classroom(&self, teacher_id: Uuid) -> Result<Classroom> {
        let now = timestamp(&Utc::now());
        sqlx::query(
            "INSERT OR IGNORE INTO classrooms (id, teacher_id, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(teacher_id.to_string())
        .bind(&now)
        .execute(&self.pool)
        .await?;

        self.get_classroom(teacher_id)
            .await?
            .context("classroom missing after insert")
    }

    /// Appends the student; returns false when they were already on the roster.
    pub async fn add_classroom_student(&self, classroom_id: Uuid, student_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO classroom_students (classroom_id, student_id, position)
            VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1
                             FROM classroom_students WHERE classroom_id = ?1))
            "#,
        )
        .bind(classroom_id.to_string())
        .bind(student_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn remove_classroom_student(&self, classroom_id: Uuid, student_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM classroom_students WHERE classroom_id = ?1 AND student_id = ?2",
        )
        .bind(classroom_id.to_string())
        .bind(student_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn list_classroom_students(&self, teacher_id: Uuid) -> Result<Vec<StudentRef>> {
        let rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.disability_type
            FROM classrooms c
            JOIN classroom_students cs ON cs.classroom_id = c.id
            JOIN users u ON u.id = cs.student_id
            WHERE c.teacher_id = ?1
            ORDER BY cs.position ASC
            "#,
        )
        .bind(teacher_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_student_ref).collect()
    }

    // Task operations
    pub async fn insert_task(
        &self,
        id: Uuid,
        teacher_id: Uuid,
        lesson_id: Uuid,
        student_ids: &[Uuid],
        title: &str,
        due_date: Option<DateTime<Utc>>,
        note: &str,
    ) -> Result<()> {
        let now = timestamp(&Utc::now());
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO tasks (id, teacher_id, lesson_id, title, due_date, note, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            "#,
        )
        .bind(id.to_string())
        .bind(teacher_id.to_string())
        .bind(lesson_id.to_string())
        .bind(title)
        .bind(due_date.as_ref().map(timestamp))
        .bind(note)
        .bind(TaskStatus::Assigned.as_str())
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        for (position, student_id) in student_ids.iter().enumerate() {
            sqlx::query(
                "INSERT OR IGNORE INTO task_students (task_id, student_id, position) VALUES (?1, ?2, ?3)",
            )
            .bind(id.to_string())
            .bind(student_id.to_string())
            .bind(position as i64)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_task(&self, id: Uuid) -> Result<Option<Task>> {
        let row = sqlx::query(&format!("{} WHERE t.id = ?1", TASK_SELECT))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(self.row_to_task(&row).await?)),
            None => Ok(None),
        }
    }

    /// Newest first; every teacher's tasks when `teacher_id` is `None`.
    pub async fn list_tasks(&self, teacher_id: Option<Uuid>) -> Result<Vec<Task>> {
        let started = Instant::now();
        let rows = sqlx::query(&format!(
            "{} WHERE (?1 IS NULL OR t.teacher_id = ?1) ORDER BY t.created_at DESC, t.rowid DESC",
            TASK_SELECT
        ))
        .bind(teacher_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;

        let mut tasks = Vec::with_capacity(rows.len());
        for row in &rows {
            tasks.push(self.row_to_task(row).await?);
        }

        log_db_operation!(
            debug,
            "list_tasks",
            count = tasks.len(),
            duration_ms = started.elapsed().as_millis() as u64
        );
        Ok(tasks)
    }

    async fn row_to_task(&self, row: &SqliteRow) -> Result<Task> {
        let id = parse_uuid(row, "id")?;

        let student_rows = sqlx::query(
            r#"
            SELECT u.id, u.name, u.email, u.disability_type
            FROM task_students ts
            JOIN users u ON u.id = ts.student_id
            WHERE ts.task_id = ?1
            ORDER BY ts.position ASC
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&self.pool)
        .await?;

        let students = student_rows
            .iter()
            .map(row_to_student_ref)
            .collect::<Result<Vec<_>>>()?;

        Ok(Task {
            id,
            teacher: parse_uuid(row, "teacher_id")?,
            lesson: LessonRef {
                id: parse_uuid(row, "lesson_id")?,
                title: row.try_get("lesson_title")?,
                category: row.try_get("lesson_category")?,
                difficulty: row.try_get::<String, _>("lesson_difficulty")?.parse()?,
            },
            students,
            title: row.try_get("title")?,
            due_date: parse_optional_timestamp(row, "due_date")?,
            note: row.try_get("note")?,
            status: row.try_get::<String, _>("status")?.parse()?,
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }
}

const TASK_SELECT: &str = r#"
    SELECT t.*, l.title AS lesson_title, l.category AS lesson_category,
           l.difficulty AS lesson_difficulty
    FROM tasks t
    JOIN lessons l ON l.id = t.lesson_id"#;

/// Fixed-width UTC form so text ordering matches chronological ordering.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_uuid(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let raw: String = row.try_get(column)?;
    Uuid::parse_str(&raw).with_context(|| format!("invalid uuid in column '{}'", column))
}

fn parse_optional_uuid(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| {
            Uuid::parse_str(&raw).with_context(|| format!("invalid uuid in column '{}'", column))
        })
        .transpose()
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let raw: String = row.try_get(column)?;
    Ok(DateTime::parse_from_rfc3339(&raw)
        .with_context(|| format!("invalid timestamp in column '{}'", column))?
        .with_timezone(&Utc))
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    row.try_get::<Option<String>, _>(column)?
        .map(|raw| {
            DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .with_context(|| format!("invalid timestamp in column '{}'", column))
        })
        .transpose()
}

fn row_to_user(row: &SqliteRow) -> Result<User> {
    Ok(User {
        id: parse_uuid(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get::<String, _>("role")?.parse()?,
        disability_type: row.try_get::<String, _>("disability_type")?.parse()?,
        reset_password_token: row.try_get("reset_password_token")?,
        reset_password_expires: parse_optional_timestamp(row, "reset_password_expires")?,
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn row_to_student_ref(row: &SqliteRow) -> Result<StudentRef> {
    Ok(StudentRef {
        id: parse_uuid(row, "id")?,
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        disability_type: row.try_get::<String, _>("disability_type")?.parse()?,
    })
}

fn row_to_lesson(row: &SqliteRow) -> Result<Lesson> {
    Ok(Lesson {
        id: parse_uuid(row, "id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        category: row.try_get("category")?,
        difficulty: row.try_get::<String, _>("difficulty")?.parse()?,
        author: parse_optional_uuid(row, "author_id")?,
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn row_to_quiz(row: &SqliteRow) -> Result<Quiz> {
    let questions_json: String = row.try_get("questions")?;
    Ok(Quiz {
        id: parse_uuid(row, "id")?,
        lesson_id: parse_uuid(row, "lesson_id")?,
        title: row.try_get("title")?,
        questions: serde_json::from_str(&questions_json).context("invalid quiz questions json")?,
        created_by: parse_optional_uuid(row, "created_by")?,
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn row_to_submission(row: &SqliteRow) -> Result<Submission> {
    let answers_json: String = row.try_get("answers")?;
    Ok(Submission {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        quiz_id: parse_uuid(row, "quiz_id")?,
        answers: serde_json::from_str(&answers_json).context("invalid submission answers json")?,
        score: row.try_get("score")?,
        teacher_feedback: row.try_get("teacher_feedback")?,
        status: row.try_get::<String, _>("status")?.parse()?,
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

fn row_to_progress(row: &SqliteRow) -> Result<Progress> {
    Ok(Progress {
        id: parse_uuid(row, "id")?,
        user_id: parse_uuid(row, "user_id")?,
        lesson_id: parse_uuid(row, "lesson_id")?,
        is_completed: row.try_get("is_completed")?,
        last_accessed_at: parse_timestamp(row, "last_accessed_at")?,
        quiz_score: row.try_get("quiz_score")?,
        time_spent: row.try_get("time_spent")?,
        created_at: parse_timestamp(row, "created_at")?,
        updated_at: parse_timestamp(row, "updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> Database {
        Database::new("sqlite::memory:").await.unwrap()
    }

    fn sample_user(email: &str, role: Role) -> User {
        let now = Utc::now();
        User {
            id: Uuid::new_v4(),
            name: "Test User".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
            role,
            disability_type: DisabilityType::None,
            reset_password_token: None,
            reset_password_expires: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn sample_lesson(title: &str) -> Lesson {
        let now = Utc::now();
        Lesson {
            id: Uuid::new_v4(),
            title: title.to_string(),
            content: "content".to_string(),
            category: "Math".to_string(),
            difficulty: Difficulty::Beginner,
            author: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_duplicate_email_is_rejected_by_unique_index() {
        let db = test_db().await;
        db.insert_user(&sample_user("dup@example.com", Role::Student)).await.unwrap();

        let err = db
            .insert_user(&sample_user("dup@example.com", Role::Teacher))
            .await
            .unwrap_err();
        assert!(err.to_string().to_lowercase().contains("unique constraint"));
        assert_eq!(db.list_users().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_upsert_accumulates_time() {
        let db = test_db().await;
        let user = sample_user("p@example.com", Role::Student);
        let lesson = sample_lesson("Fractions");
        db.insert_user(&user).await.unwrap();
        db.insert_lesson(&lesson).await.unwrap();

        let first = db.upsert_progress(user.id, lesson.id, Some(false), 5).await.unwrap();
        let second = db.upsert_progress(user.id, lesson.id, Some(true), 3).await.unwrap();
        let third = db.upsert_progress(user.id, lesson.id, None, 0).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.time_spent, 8);
        assert!(second.is_completed);
        assert!(third.is_completed, "omitted flag keeps the stored value");
        assert_eq!(db.list_progress(Some(user.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_progress_time_saturates_instead_of_overflowing() {
        let db = test_db().await;
        let user = sample_user("long@example.com", Role::Student);
        let lesson = sample_lesson("Marathon");
        db.insert_user(&user).await.unwrap();
        db.insert_lesson(&lesson).await.unwrap();

        db.upsert_progress(user.id, lesson.id, None, i64::MAX).await.unwrap();
        let second = db.upsert_progress(user.id, lesson.id, None, i64::MAX).await.unwrap();
        assert_eq!(second.time_spent, MAX_TOTAL_TIME_SPENT);

        let third = db.upsert_progress(user.id, lesson.id, None, 1).await.unwrap();
        assert_eq!(third.time_spent, MAX_TOTAL_TIME_SPENT);
        assert_eq!(db.list_progress(Some(user.id)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_classroom_roster_keeps_insertion_order_and_rejects_repeats() {
        let db = test_db().await;
        let teacher = sample_user("t@example.com", Role::Teacher);
        let a = sample_user("a@example.com", Role::Student);
        let b = sample_user("b@example.com", Role::Student);
        for user in [&teacher, &a, &b] {
            db.insert_user(user).await.unwrap();
        }

        let classroom = db.get_or_create_classroom(teacher.id).await.unwrap();
        let again = db.get_or_create_classroom(teacher.id).await.unwrap();
        assert_eq!(classroom.id, again.id);

        assert!(db.add_classroom_student(classroom.id, b.id).await.unwrap());
        assert!(db.add_classroom_student(classroom.id, a.id).await.unwrap());
        assert!(!db.add_classroom_student(classroom.id, b.id).await.unwrap());

        let roster = db.list_classroom_students(teacher.id).await.unwrap();
        let emails: Vec<_> = roster.iter().map(|s| s.email.as_str()).collect();
        assert_eq!(emails, vec!["b@example.com", "a@example.com"]);
    }

    #[tokio::test]
    async fn test_deleting_lesson_cascades() {
        let db = test_db().await;
        let teacher = sample_user("t2@example.com", Role::Teacher);
        let student = sample_user("s2@example.com", Role::Student);
        let lesson = sample_lesson("Cells");
        db.insert_user(&teacher).await.unwrap();
        db.insert_user(&student).await.unwrap();
        db.insert_lesson(&lesson).await.unwrap();

        db.upsert_progress(student.id, lesson.id, Some(true), 10).await.unwrap();
        db.insert_task(Uuid::new_v4(), teacher.id, lesson.id, &[student.id], "Read", None, "")
            .await
            .unwrap();

        assert!(db.delete_lesson(lesson.id).await.unwrap());
        assert!(db.list_progress(None).await.unwrap().is_empty());
        assert!(db.list_tasks(None).await.unwrap().is_empty());
    }
}
