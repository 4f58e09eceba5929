use std::time::Duration;

pub const VIEW_TTL: Duration = Duration::from_secs(5 * 60);

const KEY_PREFIX: &str = "wordapp:v2";

/// Per-user derived views that may be memoized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheView {
    Stats,
    Overview,
    WordList,
    DueWords,
    IncorrectWords,
}

impl CacheView {
    pub const ALL: [CacheView; 5] = [
        CacheView::Stats,
        CacheView::Overview,
        CacheView::WordList,
        CacheView::DueWords,
        CacheView::IncorrectWords,
    ];

    pub fn name(self) -> &'static str {
        match self {
            CacheView::Stats => "studyStats",
            CacheView::Overview => "studyOverview",
            CacheView::WordList => "wordList",
            CacheView::DueWords => "dueWords",
            CacheView::IncorrectWords => "incorrectWords",
        }
    }

    pub fn key(self, user_id: &str) -> String {
        format!("{KEY_PREFIX}:{}:{}", self.name(), user_id)
    }
}

/// State-changing operations that touch cached inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    CreateWord,
    UpdateWord,
    DeleteWord,
    ImportWords,
    Review,
    RecordStudyDay,
}

const WORD_CONTENT_VIEWS: &[CacheView] = &[
    CacheView::WordList,
    CacheView::DueWords,
    CacheView::IncorrectWords,
    CacheView::Overview,
];

const REVIEW_VIEWS: &[CacheView] = &[
    CacheView::DueWords,
    CacheView::IncorrectWords,
    CacheView::Stats,
    CacheView::Overview,
];

const STUDY_DAY_VIEWS: &[CacheView] = &[CacheView::Stats, CacheView::Overview];

impl Mutation {
    /// Views whose cached value may be stale once this mutation has committed.
    pub fn invalidates(self) -> &'static [CacheView] {
        match self {
            Mutation::CreateWord
            | Mutation::UpdateWord
            | Mutation::DeleteWord
            | Mutation::ImportWords => WORD_CONTENT_VIEWS,
            Mutation::Review => REVIEW_VIEWS,
            Mutation::RecordStudyDay => STUDY_DAY_VIEWS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Mutation::CreateWord => "create_word",
            Mutation::UpdateWord => "update_word",
            Mutation::DeleteWord => "delete_word",
            Mutation::ImportWords => "import_words",
            Mutation::Review => "review",
            Mutation::RecordStudyDay => "record_study_day",
        }
    }
}
