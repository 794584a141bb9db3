//! Column layouts of the IEDB prediction methods.
//!
//! Every layout names the shared columns the same way (`allele`, `start`, `end`,
//! `peptide`, `percentile_rank`, optionally `core`) so one row-to-epitope mapping
//! serves all methods.

use super::table::{Column, Row, TableError, TableLayout};
use crate::domain::{Epitope, MhcIIMethod, MhcIMethod};

pub static NETMHCPAN: TableLayout = TableLayout {
    name: "netmhcpan",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("peptide"),
        Column::text("core"),
        Column::float("ic50"),
        Column::float("percentile_rank"),
    ],
};

pub static NETMHCPAN_EL: TableLayout = TableLayout {
    name: "netmhcpan_el",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("peptide"),
        Column::text("core"),
        Column::ignore("icore"),
        Column::float("score"),
        Column::float("percentile_rank"),
    ],
};

pub static PICKPOCKET: TableLayout = TableLayout {
    name: "pickpocket",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("peptide"),
        Column::float("ic50"),
        Column::float("percentile_rank"),
    ],
};

pub static MHCFLURRY: TableLayout = TableLayout {
    name: "mhcflurry",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("peptide"),
        Column::float("ic50"),
        Column::float("percentile_rank"),
        Column::ignore("processing_score"),
        Column::ignore("presentation_score"),
        Column::ignore("presentation_percentile"),
    ],
};

pub static NETMHCIIPAN: TableLayout = TableLayout {
    name: "NetMHCIIpan",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("core"),
        Column::text("peptide"),
        Column::float("ic50"),
        Column::float("percentile_rank"),
    ],
};

pub static NETMHCIIPAN_EL: TableLayout = TableLayout {
    name: "netmhciipan_el",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("core"),
        Column::text("peptide"),
        Column::float("score"),
        Column::float("percentile_rank"),
    ],
};

pub static NETMHCIIPAN_BA: TableLayout = TableLayout {
    name: "netmhciipan_ba",
    columns: &[
        Column::text("allele"),
        Column::integer("seq_num"),
        Column::integer("start"),
        Column::integer("end"),
        Column::integer("length"),
        Column::text("core"),
        Column::text("peptide"),
        Column::float("ic50"),
        Column::float("percentile_rank"),
        Column::ignore("adjusted_rank"),
    ],
};

pub fn mhci_layout(method: MhcIMethod) -> &'static TableLayout {
    match method {
        MhcIMethod::NetMhcPan => &NETMHCPAN,
        MhcIMethod::NetMhcPanEl => &NETMHCPAN_EL,
        MhcIMethod::Pickpocket => &PICKPOCKET,
        MhcIMethod::MhcFlurry => &MHCFLURRY,
    }
}

pub fn mhcii_layout(method: MhcIIMethod) -> &'static TableLayout {
    match method {
        MhcIIMethod::NetMhcIIPan => &NETMHCIIPAN,
        MhcIIMethod::NetMhcIIPanEl => &NETMHCIIPAN_EL,
        MhcIIMethod::NetMhcIIPanBa => &NETMHCIIPAN_BA,
    }
}

/// Look a layout up by method name, for either family.
pub fn layout_by_name(name: &str) -> Option<&'static TableLayout> {
    if let Ok(method) = name.parse::<MhcIMethod>() {
        return Some(mhci_layout(method));
    }
    name.parse::<MhcIIMethod>().ok().map(mhcii_layout)
}

/// Map a decoded row to an [`Epitope`].
pub fn epitope_from_row(row: &Row) -> Result<Epitope, TableError> {
    Ok(Epitope {
        allele: row.text("allele")?.to_string(),
        peptide: row.text("peptide")?.to_string(),
        percentile: row.float("percentile_rank")?,
        start: optional_position(row, "start"),
        end: optional_position(row, "end"),
        core: row.text("core").ok().map(str::to_string),
        success: row.integer("success").ok().map(|v| v != 0),
    })
}

fn optional_position(row: &Row, column: &'static str) -> Option<u32> {
    row.integer(column).ok().and_then(|v| u32::try_from(v).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::parse_table;

    #[test]
    fn test_netmhcpan_rows_map_to_epitopes() {
        let raw = "allele seq_num start end length peptide core ic50 percentile_rank\n\
                   A*01:01 1 1 9 9 MDSNTVSSF MDSNTVSSF 120.5 0.8\n\
                   A*01:01 2 2 10 9 DSNTVSSFQ DSNTVSSFQ 300.0 3.5";
        let rows = parse_table(raw, mhci_layout(MhcIMethod::NetMhcPan)).unwrap();
        let epitopes: Vec<Epitope> = rows.iter().map(|r| epitope_from_row(r).unwrap()).collect();

        assert_eq!(epitopes.len(), 2);
        assert_eq!(epitopes[0].allele, "A*01:01");
        assert_eq!(epitopes[0].peptide, "MDSNTVSSF");
        assert_eq!(epitopes[0].percentile, 0.8);
        assert_eq!(epitopes[0].start, Some(1));
        assert_eq!(epitopes[0].end, Some(9));
        assert_eq!(epitopes[1].percentile, 3.5);
        assert_eq!(epitopes[1].success, None);
    }

    #[test]
    fn test_mhcii_layout_puts_core_before_peptide() {
        let raw = "allele seq_num start end length core_peptide peptide score rank\n\
                   HLA-DRB1*01:01 1 1 15 15 VSSFQDIAR MDSNTVSSFQDIARL 0.71 0.45";
        let rows = parse_table(raw, mhcii_layout(MhcIIMethod::NetMhcIIPanEl)).unwrap();
        let epitope = epitope_from_row(&rows[0]).unwrap();

        assert_eq!(epitope.core.as_deref(), Some("VSSFQDIAR"));
        assert_eq!(epitope.peptide, "MDSNTVSSFQDIARL");
        assert_eq!(epitope.percentile, 0.45);
    }

    #[test]
    fn test_trailing_ignored_columns_are_skipped() {
        let raw = "header\nHLA-A*02:01 1 3 11 9 SNTVSSFQD 512.0 0.9 0.12 0.33 1.7";
        let rows = parse_table(raw, mhci_layout(MhcIMethod::MhcFlurry)).unwrap();
        assert!(rows[0].get("presentation_percentile").is_none());
        assert_eq!(epitope_from_row(&rows[0]).unwrap().percentile, 0.9);
    }

    #[test]
    fn test_layouts_resolve_by_method_name() {
        assert_eq!(layout_by_name("pickpocket").unwrap().name, "pickpocket");
        assert_eq!(layout_by_name("netmhciipan_ba").unwrap().name, "netmhciipan_ba");
        assert!(layout_by_name("consensus").is_none());
    }
}
