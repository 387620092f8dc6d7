use serde::Deserialize;

/// One system/user prompt pair handed to the generation provider. The three
/// capabilities share the whole gating pipeline and differ only here.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPrompt {
    pub system: String,
    pub user: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonPlanRequest {
    pub teacher_name: Option<String>,
    pub grade_level: String,
    pub subject: String,
    pub topic: String,
    pub duration_minutes: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRequest {
    pub grade_level: String,
    pub subject: String,
    pub topic: String,
    pub question_count: u32,
    pub difficulty: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsletterRequest {
    pub teacher_name: Option<String>,
    pub class_name: Option<String>,
    pub highlights: String,
    pub announcements: Option<String>,
}

pub fn lesson_plan_prompt(request: &LessonPlanRequest) -> DocumentPrompt {
    let mut user = format!(
        "Write a complete lesson plan for a {} class on \"{}\", grade level {}.",
        request.subject, request.topic, request.grade_level
    );
    if let Some(minutes) = request.duration_minutes {
        user.push_str(&format!(" The lesson lasts {} minutes.", minutes));
    }
    if let Some(name) = request.teacher_name.as_deref() {
        user.push_str(&format!(" The teacher's name is {}.", name));
    }

    DocumentPrompt {
        system: "You are an experienced educator who writes structured, \
                 classroom-ready lesson plans with objectives, materials, \
                 activities and assessment."
            .to_string(),
        user,
    }
}

pub fn evaluation_prompt(request: &EvaluationRequest) -> DocumentPrompt {
    DocumentPrompt {
        system: "You are an experienced educator who writes fair, clearly \
                 worded student evaluations with an answer key."
            .to_string(),
        user: format!(
            "Write an evaluation for a {} class on \"{}\", grade level {}, \
             with {} questions at {} difficulty.",
            request.subject,
            request.topic,
            request.grade_level,
            request.question_count,
            request.difficulty
        ),
    }
}

pub fn newsletter_prompt(request: &NewsletterRequest) -> DocumentPrompt {
    let mut user = format!(
        "Write a classroom newsletter for families. Highlights: {}.",
        request.highlights
    );
    if let Some(announcements) = request.announcements.as_deref() {
        user.push_str(&format!(" Announcements: {}.", announcements));
    }
    if let Some(class_name) = request.class_name.as_deref() {
        user.push_str(&format!(" The class is {}.", class_name));
    }
    if let Some(name) = request.teacher_name.as_deref() {
        user.push_str(&format!(" Sign it from {}.", name));
    }

    DocumentPrompt {
        system: "You are a warm, professional teacher writing a short \
                 newsletter for students' families."
            .to_string(),
        user,
    }
}
