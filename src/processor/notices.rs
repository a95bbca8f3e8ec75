//! Channel notice texts

pub fn limit_reached(actor_id: &str, max_per_day: i64) -> String {
    format!(
        "Sorry <@{}>, you have reached your daily limit of {} beers.",
        actor_id, max_per_day
    )
}

pub fn would_exceed(actor_id: &str, requested: i64, remaining: i64) -> String {
    format!(
        "Sorry <@{}>, you are trying to give {} beers, but you only have {} left for today.",
        actor_id, requested, remaining
    )
}

pub fn confirmation(giver_id: &str, recipient_id: &str, count: i64) -> String {
    if count == 1 {
        format!("<@{}> gave 1 beer to <@{}>!", giver_id, recipient_id)
    } else {
        format!("<@{}> gave {} beers to <@{}>!", giver_id, count, recipient_id)
    }
}
