use crate::models::Sender;

/// The 28 warmed sub-domains shared by every campaign's planner and
/// dispatcher, in stable index order — `domain_index` on a queue item is a
/// position into this slice and must never be re-sorted.
pub const BASE_DOMAINS: [&str; 28] = [
    "connect-ozlistings.com",
    "engage-ozlistings.com",
    "get-ozlistings.com",
    "join-ozlistings.com",
    "outreach-ozlistings.com",
    "ozlistings-reach.com",
    "reach-ozlistings.com",
    "access-ozlistings.com",
    "contact-ozlistings.com",
    "direct-ozlistings.com",
    "grow-ozlistings.com",
    "growth-ozlistings.com",
    "link-ozlistings.com",
    "network-ozlistings.com",
    "ozlistings-access.com",
    "ozlistings-connect.com",
    "ozlistings-contact.com",
    "ozlistings-direct.com",
    "ozlistings-engage.com",
    "ozlistings-get.com",
    "ozlistings-grow.com",
    "ozlistings-join.com",
    "ozlistings-link.com",
    "ozlistings-network.com",
    "ozlistings-outreach.com",
    "ozlistings-team.com",
    "ozlistngs-growth.com",
    "team-ozlistings.com",
];

pub fn pool_size() -> usize {
    BASE_DOMAINS.len()
}

pub fn domain_at(index: usize) -> Option<&'static str> {
    BASE_DOMAINS.get(index).copied()
}

/// `"{display_name} <{local}@{domain}>"` for the given sender and domain
/// index.
pub fn from_email(sender: Sender, domain_index: usize) -> Option<String> {
    let domain = domain_at(domain_index)?;
    Some(format!(
        "{} <{}@{}>",
        sender.display_name(),
        sender.local_part(),
        domain
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_has_28_domains() {
        assert_eq!(pool_size(), 28);
    }

    #[test]
    fn from_email_formats_todd() {
        assert_eq!(
            from_email(Sender::ToddVitzthum, 0).unwrap(),
            "Todd Vitzthum <todd.vitzthum@connect-ozlistings.com>"
        );
    }

    #[test]
    fn from_email_out_of_range_is_none() {
        assert!(from_email(Sender::JeffRichmond, 28).is_none());
    }
}
