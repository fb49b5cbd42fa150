use crate::error::{CounselError, CounselResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

pub const MAX_REGISTERED_SUBJECTS: usize = 3;

/// String-backed enum stored as TEXT and exchanged as its display label.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl FromStr for $name {
            type Err = CounselError;

            fn from_str(s: &str) -> CounselResult<Self> {
                match s.trim() {
                    $($text => Ok($name::$variant),)+
                    other => Err(CounselError::Validation(format!(
                        "{}: 알 수 없는 값 '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(Role {
    Admin => "Admin",
    Director => "Director",
    TeamLead => "TeamLead",
    Counselor => "Counselor",
});

impl Role {
    pub fn can_access_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::Director)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "관리자",
            Role::Director => "원장",
            Role::TeamLead => "팀장",
            Role::Counselor => "상담사",
        }
    }
}

text_enum!(ProfileStatus {
    Active => "Active",
    Inactive => "Inactive",
});

text_enum!(AppointmentStatus {
    Scheduled => "상담 예정",
    Completed => "상담 완료",
    Registered => "등록",
    Cancelled => "상담 취소",
    Refunded => "취소/환불",
});

impl AppointmentStatus {
    pub fn color(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "#3788d8",
            AppointmentStatus::Completed => "#198754",
            AppointmentStatus::Registered => "#ffc107",
            AppointmentStatus::Cancelled => "#6c757d",
            AppointmentStatus::Refunded => "#dc3545",
        }
    }

    /// A consultation actually took place (registration implies it).
    pub fn is_consulted(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::Completed | AppointmentStatus::Registered
        )
    }
}

text_enum!(ConsultType {
    Online => "Online",
    Offline => "Offline",
});

text_enum!(RegistrationType {
    National => "국기",
    General => "일반",
});

text_enum!(PaymentMethod {
    OnlineCard => "온라인:카드",
    OnlineTransfer => "온라인:계좌",
    Terminal => "단말기",
    CompanyAccount => "회사 계좌",
});

text_enum!(CancellationReason {
    Absent => "부재",
    OtherInstitution => "타기관 등록",
    Personal => "개인 사유",
});

text_enum!(CancellationType {
    NationalCancel => "국기 취소",
    GeneralRefund => "일반 환불",
});

text_enum!(ActivityAction {
    Created => "신규 등록",
    Updated => "정보 수정",
    Deleted => "삭제",
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "registration_type")]
pub enum RegistrationPlan {
    #[serde(rename = "국기")]
    National,
    #[serde(rename = "일반")]
    General {
        months: i32,
        amount: i64,
        payment_method: PaymentMethod,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "cancellation_type")]
pub enum RefundKind {
    #[serde(rename = "국기 취소")]
    NationalCancel,
    #[serde(rename = "일반 환불")]
    GeneralRefund {
        deduction_amount: i64,
        refund_amount: i64,
    },
}

/// Status of an appointment together with the fields that only make sense
/// for that status.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status")]
pub enum AppointmentOutcome {
    #[serde(rename = "상담 예정")]
    Scheduled,
    #[serde(rename = "상담 완료")]
    Completed,
    #[serde(rename = "등록")]
    Registered {
        subject_ids: Vec<i32>,
        plan: RegistrationPlan,
    },
    #[serde(rename = "상담 취소")]
    Cancelled { reason: CancellationReason },
    #[serde(rename = "취소/환불")]
    Refunded { refund: RefundKind },
}

/// Conditional columns as persisted on the appointments table.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OutcomeColumns {
    pub cancellation_reason: Option<String>,
    pub registration_type: Option<String>,
    pub registration_months: Option<i32>,
    pub registration_amount: Option<i64>,
    pub payment_method: Option<String>,
    pub cancellation_type: Option<String>,
    pub deduction_amount: Option<i64>,
    pub refund_amount: Option<i64>,
}

impl AppointmentOutcome {
    pub fn status(&self) -> AppointmentStatus {
        match self {
            AppointmentOutcome::Scheduled => AppointmentStatus::Scheduled,
            AppointmentOutcome::Completed => AppointmentStatus::Completed,
            AppointmentOutcome::Registered { .. } => AppointmentStatus::Registered,
            AppointmentOutcome::Cancelled { .. } => AppointmentStatus::Cancelled,
            AppointmentOutcome::Refunded { .. } => AppointmentStatus::Refunded,
        }
    }

    pub fn registered_subject_ids(&self) -> &[i32] {
        match self {
            AppointmentOutcome::Registered { subject_ids, .. } => subject_ids,
            _ => &[],
        }
    }

    pub fn columns(&self) -> OutcomeColumns {
        let mut cols = OutcomeColumns::default();
        match self {
            AppointmentOutcome::Scheduled | AppointmentOutcome::Completed => {}
            AppointmentOutcome::Registered { plan, .. } => match plan {
                RegistrationPlan::National => {
                    cols.registration_type = Some(RegistrationType::National.to_string());
                }
                RegistrationPlan::General {
                    months,
                    amount,
                    payment_method,
                } => {
                    cols.registration_type = Some(RegistrationType::General.to_string());
                    cols.registration_months = Some(*months);
                    cols.registration_amount = Some(*amount);
                    cols.payment_method = Some(payment_method.to_string());
                }
            },
            AppointmentOutcome::Cancelled { reason } => {
                cols.cancellation_reason = Some(reason.to_string());
            }
            AppointmentOutcome::Refunded { refund } => match refund {
                RefundKind::NationalCancel => {
                    cols.cancellation_type = Some(CancellationType::NationalCancel.to_string());
                }
                RefundKind::GeneralRefund {
                    deduction_amount,
                    refund_amount,
                } => {
                    cols.cancellation_type = Some(CancellationType::GeneralRefund.to_string());
                    cols.deduction_amount = Some(*deduction_amount);
                    cols.refund_amount = Some(*refund_amount);
                }
            },
        }
        cols
    }
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn required_amount(value: Option<i64>, label: &str) -> CounselResult<i64> {
    match value {
        Some(v) if v >= 0 => Ok(v),
        Some(_) => Err(CounselError::validation(format!(
            "{}은(는) 0 이상이어야 합니다.",
            label
        ))),
        None => Err(CounselError::validation(format!("{}을(를) 입력해주세요.", label))),
    }
}

/// Flat status section of the appointment form. Fields that do not apply to
/// the chosen status are ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct OutcomeFields {
    pub status: AppointmentStatus,
    #[serde(default)]
    pub cancellation_reason: Option<String>,
    #[serde(default)]
    pub registered_subject_ids: Vec<i32>,
    #[serde(default)]
    pub registration_type: Option<String>,
    #[serde(default)]
    pub registration_months: Option<i32>,
    #[serde(default)]
    pub registration_amount: Option<i64>,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub cancellation_type: Option<String>,
    #[serde(default)]
    pub deduction_amount: Option<i64>,
    #[serde(default)]
    pub refund_amount: Option<i64>,
}

impl OutcomeFields {
    pub fn into_outcome(self) -> CounselResult<AppointmentOutcome> {
        match self.status {
            AppointmentStatus::Scheduled => Ok(AppointmentOutcome::Scheduled),
            AppointmentStatus::Completed => Ok(AppointmentOutcome::Completed),
            AppointmentStatus::Cancelled => {
                let reason = present(&self.cancellation_reason)
                    .ok_or_else(|| CounselError::validation("취소 사유를 선택해주세요."))?
                    .parse::<CancellationReason>()?;
                Ok(AppointmentOutcome::Cancelled { reason })
            }
            AppointmentStatus::Registered => {
                let kind = present(&self.registration_type)
                    .ok_or_else(|| CounselError::validation("등록 유형을 선택해주세요."))?
                    .parse::<RegistrationType>()?;

                let subject_ids: Vec<i32> = self
                    .registered_subject_ids
                    .iter()
                    .copied()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                if subject_ids.is_empty() || subject_ids.len() > MAX_REGISTERED_SUBJECTS {
                    return Err(CounselError::validation(format!(
                        "등록 과목은 1개 이상 {}개 이하로 선택해야 합니다.",
                        MAX_REGISTERED_SUBJECTS
                    )));
                }

                let plan = match kind {
                    RegistrationType::National => RegistrationPlan::National,
                    RegistrationType::General => {
                        let months = match self.registration_months {
                            Some(m) if m > 0 => m,
                            _ => {
                                return Err(CounselError::validation(
                                    "등록 개월 수를 1 이상으로 입력해주세요.",
                                ))
                            }
                        };
                        let amount = required_amount(self.registration_amount, "등록 금액")?;
                        let payment_method = present(&self.payment_method)
                            .ok_or_else(|| CounselError::validation("결제 방법을 선택해주세요."))?
                            .parse::<PaymentMethod>()?;
                        RegistrationPlan::General {
                            months,
                            amount,
                            payment_method,
                        }
                    }
                };
                Ok(AppointmentOutcome::Registered { subject_ids, plan })
            }
            AppointmentStatus::Refunded => {
                let kind = present(&self.cancellation_type)
                    .ok_or_else(|| CounselError::validation("취소/환불 유형을 선택해주세요."))?
                    .parse::<CancellationType>()?;
                let refund = match kind {
                    CancellationType::NationalCancel => RefundKind::NationalCancel,
                    CancellationType::GeneralRefund => RefundKind::GeneralRefund {
                        deduction_amount: required_amount(self.deduction_amount, "공제금")?,
                        refund_amount: required_amount(self.refund_amount, "환불금")?,
                    },
                };
                Ok(AppointmentOutcome::Refunded { refund })
            }
        }
    }
}

impl AppointmentOutcome {
    /// Rebuilds the outcome from stored columns. Rows that do not carry the
    /// fields their status needs yield `None`.
    pub fn from_columns(
        status: AppointmentStatus,
        cols: &OutcomeColumns,
        subject_ids: Vec<i32>,
    ) -> Option<Self> {
        let fields = OutcomeFields {
            status,
            cancellation_reason: cols.cancellation_reason.clone(),
            registered_subject_ids: subject_ids,
            registration_type: cols.registration_type.clone(),
            registration_months: cols.registration_months,
            registration_amount: cols.registration_amount,
            payment_method: cols.payment_method.clone(),
            cancellation_type: cols.cancellation_type.clone(),
            deduction_amount: cols.deduction_amount,
            refund_amount: cols.refund_amount,
        };
        match fields.into_outcome() {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                tracing::warn!("Stored appointment outcome is incomplete: {}", e);
                None
            }
        }
    }
}
