//! Domain models for becash-service.

mod card;
mod charge;
mod goal;
mod loyalty;
mod statement;
mod subscription;
mod user;

pub use card::{Card, CardWithLimit, CreateCard, UpdateCard};
pub use charge::{
    Charge, ChargeKind, ListChargesFilter, MonthlySummary, NewCharge, UpdateCharge,
};
pub use goal::{
    apply_contribution, Collaborator, Contribution, CreateGoal, Goal, GoalAccess, GoalDetail,
    GoalInvite, GoalRole, InviteState, NewContribution, NewInvite, Permission, UpdateGoal,
    INVITE_TTL_DAYS,
};
pub use loyalty::{accrual_points, NewPointsEntry, PointsBalance, PointsEntry, PointsReason};
pub use statement::{
    apply_payment, PayStatement, PaymentOutcome, Statement, StatementDetail, StatementPayment,
    StatementStatus,
};
pub use subscription::{
    Entitlements, Feature, PlanTier, Subscription, SubscriptionStatus, SubscriptionView,
    SyncSubscription, FREE_CARD_LIMIT,
};
pub use user::{UpsertUser, User};

#[cfg(test)]
pub(crate) use card::test_card;
