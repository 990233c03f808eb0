use super::normalizer::NormalizedDeal;
use super::stages::StageMatcher;
use super::views::ContactRecord;
use std::collections::HashSet;

/// Distinct contacts of the replied deals among `rows`, in row order.
///
/// Blank contacts are dropped; identical (contact, id) pairs collapse into
/// one record.
pub fn replied_contacts<'a, I>(rows: I, reply: &StageMatcher) -> Vec<ContactRecord>
where
    I: IntoIterator<Item = &'a NormalizedDeal>,
{
    let mut seen = HashSet::new();
    let mut contacts = Vec::new();

    for row in rows.into_iter().filter(|row| reply.matches(&row.stage)) {
        let Some(contact) = row
            .deal
            .primary_contact
            .as_deref()
            .map(str::trim)
            .filter(|contact| !contact.is_empty())
        else {
            continue;
        };

        let record = ContactRecord {
            primary_contact: contact.to_string(),
            id: row
                .deal
                .id
                .as_deref()
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .map(str::to_string),
        };

        if seen.insert(record.clone()) {
            contacts.push(record);
        }
    }

    contacts
}
