use super::default_extractor;
use crate::error::WatchError;

#[cfg(test)]
mod body_tests {
    use super::*;

    #[test]
    fn test_body_text_is_normalized() {
        let html = "<html><head><title>Ignored</title><script>var x = 1;</script></head>\
                    <body><p>Hello,   world!</p><script>alert(1)</script>\
                    <style>p { color: red }</style><p>Second\n\n  line</p></body></html>";
        let snapshot = default_extractor().extract(html).unwrap();
        assert_eq!(snapshot.text, "Hello, world! Second line");
    }

    #[test]
    fn test_navigation_elements_are_removed() {
        let html = "<body><nav><a href=\"/x\">Acme Partners</a></nav>\
                    <div class=\"site-menu\">Menu stuff text</div>\
                    <header>Header text</header>\
                    <div id=\"navbar-top\">Top bar</div>\
                    <p>Main content here</p></body>";
        let snapshot = default_extractor().extract(html).unwrap();
        assert_eq!(snapshot.text, "Main content here");
        assert!(snapshot.links.is_empty());
    }

    #[test]
    fn test_body_classes_never_remove_the_body() {
        let html = "<body class=\"has-navbar\"><p>Still here</p></body>";
        let snapshot = default_extractor().extract(html).unwrap();
        assert_eq!(snapshot.text, "Still here");
    }

    #[test]
    fn test_blank_document_fails() {
        for html in ["", "   \n\t  "] {
            let result = default_extractor().extract(html);
            assert!(matches!(result, Err(WatchError::ExtractionFailed(_))));
        }
    }
}

#[cfg(test)]
mod link_tests {
    use super::*;

    #[test]
    fn test_links_are_extracted_and_filtered() {
        let html = "<body>\
                    <a href=\"/about\">About</a>\
                    <a href=\"https://acme.com\" title=\"Acme site\" aria-label=\"Acme\" data-id=\"7\">Acme Corp</a>\
                    <a href=\"https://acme.com\">Acme   Corp</a>\
                    <a href=\"/empty\"> </a>\
                    <a name=\"anchor\">No href</a>\
                    </body>";
        let snapshot = default_extractor().extract(html).unwrap();

        // Navigation text, duplicates, empty text and missing hrefs are all skipped
        assert_eq!(snapshot.links.len(), 1);
        let link = &snapshot.links[0];
        assert_eq!(link.text, "Acme Corp");
        assert_eq!(link.href, "https://acme.com");
        assert_eq!(link.title, "Acme site");
        assert_eq!(link.aria_label, "Acme");
        assert_eq!(link.data_id, "7");
    }
}

#[cfg(test)]
mod image_tests {
    use super::*;

    #[test]
    fn test_images_are_extracted_with_identity() {
        let html = "<body>\
                    <img src=\"/a.png\" alt=\"Alpha\" width=\"120\" loading=\"lazy\">\
                    <img data-src=\"/lazy/b.png\">\
                    <img alt=\"no source\">\
                    <img src=\"/a.png\" alt=\"Alpha\" class=\"duplicate\">\
                    </body>";
        let snapshot = default_extractor().extract(html).unwrap();

        assert_eq!(snapshot.images.len(), 2);

        let first = &snapshot.images[0];
        assert_eq!(first.src, "/a.png");
        assert_eq!(first.width, "120");
        assert_eq!(first.loading, "lazy");
        assert_eq!(first.unique_id, "src:/a.png | alt:Alpha");

        let lazy = &snapshot.images[1];
        assert_eq!(lazy.src, "");
        assert_eq!(lazy.data_src, "/lazy/b.png");
        assert_eq!(lazy.unique_id, "/lazy/b.png");
    }

    #[test]
    fn test_identity_is_stable_across_renders() {
        let before = "<body><img src=\"/a.png\" alt=\"Alpha\" class=\"small\"></body>";
        let after = "<body><img src=\"/a.png\" alt=\"Alpha\" class=\"large\" width=\"300\"></body>";
        let extractor = default_extractor();
        let old = extractor.extract(before).unwrap();
        let new = extractor.extract(after).unwrap();
        assert_eq!(old.images[0].unique_id, new.images[0].unique_id);
    }
}
