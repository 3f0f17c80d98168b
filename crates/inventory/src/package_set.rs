//! Package sets: the inventorized, undispatched packages of one item.

use goodstock_core::PackageId;

use crate::package::Package;

/// Whether a package counts as a member of its item's set.
pub fn is_member(package: &Package) -> bool {
    package.item_id.is_some() && package.is_inventorized() && !package.is_dispatched() && !package.is_deleted()
}

/// Work out the `package_set_id` every package of one item should carry.
///
/// Returns only the packages whose value changes. With two or more members
/// each member points at the lowest member id; everything else is cleared.
pub fn resolve<'a, I>(packages: I) -> Vec<(PackageId, Option<PackageId>)>
where
    I: IntoIterator<Item = &'a Package>,
{
    let packages: Vec<&Package> = packages.into_iter().collect();
    let members: Vec<PackageId> = packages
        .iter()
        .filter(|p| is_member(p))
        .map(|p| p.id)
        .collect();
    let set_id = if members.len() >= 2 {
        members.iter().min().copied()
    } else {
        None
    };

    packages
        .iter()
        .filter_map(|p| {
            let wanted = if members.contains(&p.id) { set_id } else { None };
            (p.package_set_id != wanted).then_some((p.id, wanted))
        })
        .collect()
}
