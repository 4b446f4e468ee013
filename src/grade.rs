/// Grade stored on an enrollment before anything has been computed for it.
pub const UNGRADED: &str = "--";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LetterGrade {
    A,
    AMinus,
    BPlus,
    B,
    BMinus,
    CPlus,
    C,
    CMinus,
    DPlus,
    D,
    DMinus,
    E,
}

/// Lower percentage bound for each letter, highest first. Anything below the
/// last entry is an E. The boundaries are part of the compatibility contract
/// with existing gradebooks and must not drift.
const GRADE_SCALE: [(f64, LetterGrade); 11] = [
    (93.0, LetterGrade::A),
    (90.0, LetterGrade::AMinus),
    (87.0, LetterGrade::BPlus),
    (83.0, LetterGrade::B),
    (80.0, LetterGrade::BMinus),
    (77.0, LetterGrade::CPlus),
    (73.0, LetterGrade::C),
    (70.0, LetterGrade::CMinus),
    (67.0, LetterGrade::DPlus),
    (63.0, LetterGrade::D),
    (60.0, LetterGrade::DMinus),
];

impl LetterGrade {
    pub fn as_str(self) -> &'static str {
        match self {
            LetterGrade::A => "A",
            LetterGrade::AMinus => "A-",
            LetterGrade::BPlus => "B+",
            LetterGrade::B => "B",
            LetterGrade::BMinus => "B-",
            LetterGrade::CPlus => "C+",
            LetterGrade::C => "C",
            LetterGrade::CMinus => "C-",
            LetterGrade::DPlus => "D+",
            LetterGrade::D => "D",
            LetterGrade::DMinus => "D-",
            LetterGrade::E => "E",
        }
    }

    /// Exact-match parse of the stored grade string. The `"--"` sentinel and
    /// anything else unrecognized yields `None`.
    pub fn parse(s: &str) -> Option<LetterGrade> {
        match s {
            "A" => Some(LetterGrade::A),
            "A-" => Some(LetterGrade::AMinus),
            "B+" => Some(LetterGrade::BPlus),
            "B" => Some(LetterGrade::B),
            "B-" => Some(LetterGrade::BMinus),
            "C+" => Some(LetterGrade::CPlus),
            "C" => Some(LetterGrade::C),
            "C-" => Some(LetterGrade::CMinus),
            "D+" => Some(LetterGrade::DPlus),
            "D" => Some(LetterGrade::D),
            "D-" => Some(LetterGrade::DMinus),
            "E" => Some(LetterGrade::E),
            _ => None,
        }
    }

    /// 4.0-scale point value used for GPA.
    pub fn points(self) -> f64 {
        match self {
            LetterGrade::A => 4.0,
            LetterGrade::AMinus => 3.7,
            LetterGrade::BPlus => 3.3,
            LetterGrade::B => 3.0,
            LetterGrade::BMinus => 2.7,
            LetterGrade::CPlus => 2.3,
            LetterGrade::C => 2.0,
            LetterGrade::CMinus => 1.7,
            LetterGrade::DPlus => 1.3,
            LetterGrade::D => 1.0,
            LetterGrade::DMinus => 0.7,
            LetterGrade::E => 0.0,
        }
    }

    /// Maps a class percentage to a letter. Bounds are inclusive at the low
    /// end: exactly 93.0 is an A, anything under 60.0 is an E.
    pub fn from_percent(percent: f64) -> LetterGrade {
        for (min, letter) in GRADE_SCALE {
            if percent >= min {
                return letter;
            }
        }
        LetterGrade::E
    }
}

/// One submission by the student being graded, paired with the max points of
/// the assignment it answers. `score: None` is a submission awaiting a mark;
/// it still pulls its category into the calculation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedScore {
    pub max_points: u32,
    pub score: Option<u32>,
}

/// One category of a class together with every submission the student has in
/// it. `scores` is empty when the student submitted nothing in the category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryScores {
    pub weight: u32,
    pub scores: Vec<SubmittedScore>,
}

/// Weighted class percentage over the categories the student has submissions
/// in. A category without submissions contributes to neither the numerator
/// nor the denominator; the remaining weights are renormalized to 100, so a
/// student graded only on "Homework" is scored as if homework were the whole
/// class.
///
/// Returns `None` when no category qualifies, or when the qualifying weights
/// sum to zero. Callers persist `UNGRADED` in that case.
pub fn weighted_percent(categories: &[CategoryScores]) -> Option<f64> {
    let mut weighted_sum = 0.0_f64;
    let mut used_weight = 0.0_f64;

    for cat in categories {
        if cat.scores.is_empty() {
            continue;
        }
        let max_total: u32 = cat.scores.iter().map(|s| s.max_points).sum();
        if max_total == 0 {
            continue;
        }
        let score_total: u32 = cat.scores.iter().map(|s| s.score.unwrap_or(0)).sum();

        weighted_sum += (score_total as f64 / max_total as f64) * cat.weight as f64;
        used_weight += cat.weight as f64;
    }

    if used_weight > 0.0 {
        Some(weighted_sum * 100.0 / used_weight)
    } else {
        None
    }
}

pub fn class_grade(categories: &[CategoryScores]) -> Option<LetterGrade> {
    weighted_percent(categories).map(LetterGrade::from_percent)
}

/// Simple mean of grade points over the enrollments that carry a recognized
/// letter. The `"--"` sentinel and malformed values are dropped from both the
/// sum and the count rather than treated as failures; an E counts as 0.0
/// points but still counts as a graded class. No graded enrollments at all is
/// a 0.0 GPA. Every class weighs the same (four credit hours).
pub fn grade_point_average<'a, I>(grades: I) -> f64
where
    I: IntoIterator<Item = &'a str>,
{
    let mut total = 0.0_f64;
    let mut counted = 0_usize;

    for g in grades {
        if let Some(letter) = LetterGrade::parse(g) {
            total += letter.points();
            counted += 1;
        }
    }

    if counted > 0 {
        total / counted as f64
    } else {
        0.0
    }
}
