//! Admin registrations of the labs models.

use ormlabs_admin::{AdminSite, ModelAdmin};
use ormlabs_core::LabsResult;

use crate::models::{Community, Event, Member, Registration};

/// Builds the labs admin site.
pub fn admin_site() -> LabsResult<AdminSite> {
    let mut site = AdminSite::new("admin");
    site.register::<Registration>(
        ModelAdmin::for_model::<Registration>()
            .list_display(vec![
                "id",
                "event",
                "member",
                "ticket",
                "discount",
                "online",
                "registered_on",
            ])
            .list_filter(vec!["event", "member"]),
    )?;
    site.register::<Community>(
        ModelAdmin::for_model::<Community>().list_display(vec!["id", "name"]),
    )?;
    site.register::<Member>(
        ModelAdmin::for_model::<Member>()
            .list_display(vec!["id", "first_name", "last_name", "community"]),
    )?;
    site.register::<Event>(
        ModelAdmin::for_model::<Event>().list_display(vec!["id", "name", "start", "end"]),
    )?;
    Ok(site)
}
