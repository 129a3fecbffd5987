use quick_xml::escape::escape;
use tracing::debug;

use crate::errors::Result;
use crate::model::{Entry, ResolvedMedia};
use crate::session::ControlSession;

/// Resolve an entry to a playable URI and transport metadata.
///
/// Entries without a service client pass through unchanged: whatever
/// URI and metadata they carry is already usable by the transport.
/// Service-backed entries resolve through the linked account matching
/// the service type, or anonymously when no account is linked. The
/// returned URI is XML-escaped for embedding in transport requests.
pub async fn resolve_media(session: &ControlSession, entry: &Entry) -> Result<ResolvedMedia> {
    let Some(client) = entry.service_client.clone() else {
        return Ok(ResolvedMedia::passthrough(entry));
    };

    let definition = client.service_definition().clone();
    let object_id = entry.id.clone().unwrap_or_default();

    if let Some(account) = session.account_for(&definition.service_id_encoded) {
        let uri = client.track_uri(&object_id, definition.id, &account.serial_num);
        let token = client.service_string(&definition.service_id_encoded, &account.username);
        let metadata = client.encode_item_metadata(&uri, entry, Some(&token));
        debug!(
            service = client.name(),
            item = object_id.as_str(),
            "Resolved through linked account"
        );
        return Ok(ResolvedMedia {
            uri: escape(uri.as_str()).into_owned(),
            metadata: Some(metadata),
            metadata_raw: None,
            class: None,
            title: entry.title.clone(),
        });
    }

    let uri = client.get_media_uri(&object_id).await?;
    let metadata = client.encode_item_metadata(&uri, entry, None);
    debug!(
        service = client.name(),
        item = object_id.as_str(),
        "Resolved anonymously"
    );
    Ok(ResolvedMedia {
        uri: escape(uri.as_str()).into_owned(),
        metadata: Some(metadata),
        metadata_raw: None,
        class: None,
        title: entry.title.clone(),
    })
}
