//! 账号池与账号评分

use crate::models::Account;

/// 1 GiB
pub const GIB: i64 = 1024 * 1024 * 1024;

/// 按 GiB 配置的最小剩余空间换算为字节
pub fn min_space_bytes(gib: i64) -> i64 {
    gib.max(0).saturating_mul(GIB)
}

/// 账号评分
///
/// VIP 加 1000 分，每 GiB 剩余空间 1 分，空闲比例最多 500 分。
pub fn score(account: &Account) -> i64 {
    let mut score = 0i64;

    if account.vip_status {
        score += 1000;
    }

    score += account.left_space.max(0) / GIB;

    if account.space > 0 {
        let used_ratio = account.used_space as f64 / account.space as f64;
        score += ((1.0 - used_ratio) * 500.0).floor() as i64;
    }

    score
}

/// 是否可参与选择
pub fn is_eligible(account: &Account, min_space: i64) -> bool {
    account.is_valid && account.left_space >= min_space
}

/// 选出得分最高的可用账号，同分时取靠前者
pub fn select_best(candidates: &[Account], min_space: i64) -> Option<&Account> {
    best_of(candidates.iter(), min_space)
}

fn best_of<'a, I>(candidates: I, min_space: i64) -> Option<&'a Account>
where
    I: Iterator<Item = &'a Account>,
{
    let mut best: Option<(&Account, i64)> = None;
    for account in candidates.filter(|a| is_eligible(a, min_space)) {
        let s = score(account);
        if best.map_or(true, |(_, top)| s > top) {
            best = Some((account, s));
        }
    }
    best.map(|(account, _)| account)
}

/// 某个平台的账号视图
#[derive(Debug, Clone, Default)]
pub struct AccountPool {
    accounts: Vec<Account>,
}

impl AccountPool {
    pub fn new(accounts: Vec<Account>) -> Self {
        Self { accounts }
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// 属于指定平台且满足空间要求的账号
    pub fn eligible(&self, pan_id: i64, min_space: i64) -> Vec<Account> {
        self.accounts
            .iter()
            .filter(|a| a.pan_id == pan_id && is_eligible(a, min_space))
            .cloned()
            .collect()
    }

    pub fn select_best(&self, pan_id: i64, min_space: i64) -> Option<&Account> {
        best_of(self.accounts.iter().filter(|a| a.pan_id == pan_id), min_space)
    }
}
