use serde::{Deserialize, Serialize};

use super::AccountId;

macro_rules! search_index_types {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// Kind of account-centric search entry.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum SearchIndexType {
            $($variant),*
        }

        impl SearchIndexType {
            /// Every known type, in declaration order.
            pub const ALL: &'static [SearchIndexType] = &[$(Self::$variant),*];

            /// Stable name used in storage and configuration.
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $name),*
                }
            }

            /// Parse a stable name.
            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(Self::$variant),)*
                    _ => None,
                }
            }
        }
    };
}

search_index_types! {
    AccountCreated => "account_created",
    AccountKilled => "account_killed",
    BalanceTransfer => "balance_transfer",
    BalancesDeposit => "balances_deposit",
    Slashed => "slashed",
    StakingSession => "staking_session",
    StakingBonded => "staking_bonded",
    StakingUnbonded => "staking_unbonded",
    StakingWithdrawn => "staking_withdrawn",
    StakingBond => "staking_bond",
    StakingBondExtra => "staking_bond_extra",
    StakingUnbond => "staking_unbond",
    StakingWithdrawUnbonded => "staking_withdraw_unbonded",
    StakingNominate => "staking_nominate",
    StakingValidate => "staking_validate",
    StakingChill => "staking_chill",
    StakingSetPayee => "staking_set_payee",
    ImOnlineHeartbeatReceived => "imonline_heartbeat_received",
    ImOnlineSomeOffline => "imonline_some_offline",
    IdentitySet => "identity_set",
    IdentityCleared => "identity_cleared",
    IdentityKilled => "identity_killed",
    IdentitySetSubs => "identity_set_subs",
    IdentityJudgementGiven => "identity_judgement_given",
    IdentityJudgementRequested => "identity_judgement_requested",
    IdentityJudgementUnrequested => "identity_judgement_unrequested",
    CouncilProposed => "council_proposed",
    CouncilVote => "council_vote",
    CouncilMemberElected => "council_member_elected",
    CouncilMemberKicked => "council_member_kicked",
    CouncilCandidacyRenounced => "council_candidacy_renounced",
    CouncilCandidacySubmitted => "council_candidacy_submitted",
    CouncilCandidateVoted => "council_candidate_voted",
    TechCommProposed => "techcomm_proposed",
    TechCommVote => "techcomm_vote",
    DemocracyProposed => "democracy_proposed",
    DemocracySecond => "democracy_second",
    DemocracyVote => "democracy_vote",
    DemocracyProxyVote => "democracy_proxy_vote",
    TreasuryProposed => "treasury_proposed",
    TreasuryAwarded => "treasury_awarded",
    ClaimsClaimed => "claims_claimed",
}

/// Secondary lookup tuple for "latest items of type T for account A".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchIndex {
    pub block_number: u64,
    pub extrinsic_idx: Option<u32>,
    pub event_idx: Option<u32>,
    pub account_id: AccountId,
    pub index_type: SearchIndexType,
    /// Domain amount (e.g. transfer value) when the item carries one,
    /// otherwise the item's position in its block.
    pub sorting_value: Option<u128>,
}

impl SearchIndex {
    /// Position of the originating item within its block.
    pub fn item_idx(&self) -> u32 {
        self.event_idx.or(self.extrinsic_idx).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_roundtrip() {
        for ty in SearchIndexType::ALL {
            assert_eq!(SearchIndexType::from_name(ty.as_str()), Some(*ty));
        }
        assert_eq!(SearchIndexType::from_name("nope"), None);
    }
}
