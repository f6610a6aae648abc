//! Account roles and the per-role configuration table.
//!
//! Validation, username generation and navigation all read from
//! [`Role::profile`], so adding a field requirement or a menu entry is a
//! one-row change.

use serde::Serialize;
use std::fmt;

/// Username infix used when the role string is not one of the known roles.
pub const FALLBACK_ROLE_TAG: &str = "user";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Administrator,
    HeadTeacher,
    ClassTeacher,
    SubjectTeacher,
    Student,
}

/// Profile attributes that a role may require at provisioning time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredField {
    Name,
    ClassName,
    Subject,
}

impl RequiredField {
    pub fn key(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::ClassName => "className",
            Self::Subject => "subject",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub label: &'static str,
    pub href: &'static str,
}

const fn nav(label: &'static str, href: &'static str) -> NavItem {
    NavItem { label, href }
}

pub struct RoleProfile {
    pub label: &'static str,
    pub username_tag: &'static str,
    pub required: &'static [RequiredField],
    pub can_provision: bool,
    pub navigation: &'static [NavItem],
}

const DASHBOARD: NavItem = nav("Dashboard", "/dashboard");

const ADMINISTRATOR: RoleProfile = RoleProfile {
    label: "Administrator",
    username_tag: "admin",
    required: &[RequiredField::Name],
    can_provision: true,
    navigation: &[
        DASHBOARD,
        nav("School Setup", "/school-setup"),
        nav("Class Management", "/classes"),
        nav("Student Management", "/students"),
        nav("Assessments", "/assessments"),
        nav("Reports", "/reports"),
        nav("Comments", "/comments"),
        nav("System Settings", "/settings"),
    ],
};

const HEAD_TEACHER: RoleProfile = RoleProfile {
    label: "Head Teacher",
    username_tag: "head",
    required: &[RequiredField::Name],
    can_provision: false,
    navigation: &[
        DASHBOARD,
        nav("Classes", "/classes"),
        nav("Students", "/students"),
        nav("Reports", "/reports"),
        nav("Comments", "/comments"),
    ],
};

const TEACHER_NAVIGATION: &[NavItem] = &[
    DASHBOARD,
    nav("My Classes", "/my-classes"),
    nav("Assessments", "/assessments"),
    nav("Comments", "/comments"),
];

const CLASS_TEACHER: RoleProfile = RoleProfile {
    label: "Class Teacher",
    username_tag: "class",
    required: &[RequiredField::Name, RequiredField::ClassName],
    can_provision: false,
    navigation: TEACHER_NAVIGATION,
};

const SUBJECT_TEACHER: RoleProfile = RoleProfile {
    label: "Subject Teacher",
    username_tag: "subj",
    required: &[RequiredField::Name, RequiredField::Subject],
    can_provision: false,
    navigation: TEACHER_NAVIGATION,
};

const STUDENT: RoleProfile = RoleProfile {
    label: "Student",
    username_tag: "stud",
    required: &[RequiredField::Name, RequiredField::ClassName],
    can_provision: false,
    navigation: &[
        DASHBOARD,
        nav("My Results", "/my-results"),
        nav("My Pathway", "/my-pathway"),
    ],
};

impl Role {
    pub const ALL: [Role; 5] = [
        Self::Administrator,
        Self::HeadTeacher,
        Self::ClassTeacher,
        Self::SubjectTeacher,
        Self::Student,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "administrator" => Some(Self::Administrator),
            "head_teacher" => Some(Self::HeadTeacher),
            "class_teacher" => Some(Self::ClassTeacher),
            "subject_teacher" => Some(Self::SubjectTeacher),
            "student" => Some(Self::Student),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Administrator => "administrator",
            Self::HeadTeacher => "head_teacher",
            Self::ClassTeacher => "class_teacher",
            Self::SubjectTeacher => "subject_teacher",
            Self::Student => "student",
        }
    }

    pub fn profile(self) -> &'static RoleProfile {
        match self {
            Self::Administrator => &ADMINISTRATOR,
            Self::HeadTeacher => &HEAD_TEACHER,
            Self::ClassTeacher => &CLASS_TEACHER,
            Self::SubjectTeacher => &SUBJECT_TEACHER,
            Self::Student => &STUDENT,
        }
    }

    /// Human-readable name shown next to the menu, e.g. "Head Teacher".
    pub fn label(self) -> &'static str {
        self.profile().label
    }

    pub fn requires(self, field: RequiredField) -> bool {
        self.profile().required.contains(&field)
    }

    pub fn navigation(self) -> &'static [NavItem] {
        self.profile().navigation
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Username infix for a raw role string; unknown roles get [`FALLBACK_ROLE_TAG`].
pub fn username_tag(raw_role: &str) -> &'static str {
    Role::parse(raw_role)
        .map(|r| r.profile().username_tag)
        .unwrap_or(FALLBACK_ROLE_TAG)
}

pub fn allowed_values() -> String {
    Role::ALL
        .iter()
        .map(|r| r.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
